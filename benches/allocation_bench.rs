//! Benchmarks for the allocation protocol on the in-memory store.
//!
//! Benchmarks cover:
//! - Uncontended allocation into a fresh slot
//! - Concurrent requests on one slot (lock contention)
//! - Concurrent requests spread across many slots
//! - Rejection path on a full slot

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

use chrono::NaiveTime;
use futures::future::join_all;
use prometheus_shift_slots::core::{
    AllocateMember, AllocationService, AssignmentMethod, BusinessDayId, MemberId, NewSlot, SlotCatalog, SlotId,
    TenantId,
};
use prometheus_shift_slots::infra::InMemoryStore;
use tokio::runtime::Runtime;

// ============================================================================
// Helpers
// ============================================================================

async fn create_slots(store: &Arc<InMemoryStore>, tenant_id: TenantId, count: usize, required_count: i32) -> Vec<SlotId> {
    let catalog = SlotCatalog::new(Arc::clone(store));
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let slot = catalog
            .create_slot(NewSlot {
                tenant_id,
                business_day_id: BusinessDayId::new(),
                instance_id: None,
                slot_name: format!("bench-{i}"),
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
                required_count,
                priority: 1,
            })
            .await
            .unwrap();
        ids.push(slot.slot_id());
    }
    ids
}

fn request(tenant_id: TenantId, slot_id: SlotId) -> AllocateMember {
    AllocateMember {
        tenant_id,
        slot_id,
        member_id: MemberId::new(),
        plan_id: None,
        method: AssignmentMethod::Auto,
        is_outside_preference: false,
    }
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_allocate_uncontended(c: &mut Criterion) {
    c.bench_function("allocate_uncontended", |b| {
        b.to_async(Runtime::new().unwrap()).iter(|| async {
            let store = Arc::new(InMemoryStore::new());
            let tenant_id = TenantId::new();
            let slot_id = create_slots(&store, tenant_id, 1, 1).await[0];
            let service = AllocationService::new(store);
            black_box(service.allocate(request(tenant_id, slot_id)).await.unwrap());
        });
    });
}

fn bench_same_slot_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("same_slot_contention");

    for callers in [8_u64, 32, 128] {
        group.throughput(Throughput::Elements(callers));
        group.bench_with_input(BenchmarkId::from_parameter(callers), &callers, |b, &callers| {
            b.to_async(Runtime::new().unwrap()).iter(|| async move {
                let store = Arc::new(InMemoryStore::new());
                let tenant_id = TenantId::new();
                let required_count = i32::try_from(callers / 2).unwrap();
                let slot_id = create_slots(&store, tenant_id, 1, required_count).await[0];
                let service = AllocationService::new(store);

                let results = join_all((0..callers).map(|_| service.allocate(request(tenant_id, slot_id)))).await;
                black_box(results);
            });
        });
    }
    group.finish();
}

fn bench_spread_slots(c: &mut Criterion) {
    let mut group = c.benchmark_group("spread_slots");

    for slots in [8_usize, 32, 128] {
        group.throughput(Throughput::Elements(slots as u64));
        group.bench_with_input(BenchmarkId::from_parameter(slots), &slots, |b, &slots| {
            b.to_async(Runtime::new().unwrap()).iter(|| async move {
                let store = Arc::new(InMemoryStore::new());
                let tenant_id = TenantId::new();
                let slot_ids = create_slots(&store, tenant_id, slots, 1).await;
                let service = AllocationService::new(store);

                let results = join_all(slot_ids.iter().map(|&slot_id| service.allocate(request(tenant_id, slot_id)))).await;
                black_box(results);
            });
        });
    }
    group.finish();
}

fn bench_full_slot_rejection(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = Arc::new(InMemoryStore::new());
    let tenant_id = TenantId::new();
    let slot_id = rt.block_on(async {
        let slot_id = create_slots(&store, tenant_id, 1, 1).await[0];
        AllocationService::new(Arc::clone(&store))
            .allocate(request(tenant_id, slot_id))
            .await
            .unwrap();
        slot_id
    });
    let service = AllocationService::new(store);

    c.bench_function("full_slot_rejection", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(service.allocate(request(tenant_id, slot_id)).await.unwrap_err());
        });
    });
}

criterion_group!(
    benches,
    bench_allocate_uncontended,
    bench_same_slot_contention,
    bench_spread_slots,
    bench_full_slot_rejection
);
criterion_main!(benches);
