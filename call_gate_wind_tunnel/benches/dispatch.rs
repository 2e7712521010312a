// Copyright 2026 the Call Gate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use call_gate::dispatch::{
    Gate, HostCtx, HostFault, Limits, NativeVal, ret_i32, slot_i32, slot_ptr,
};
use call_gate::memory::{GuestPtr, LinearMemory};
use call_gate::registry::{FuncId, PtrPolicy, RegionLen, Registration, Registry, TableEntry};
use call_gate::sig::Signature;

const CHAIN: FuncId = FuncId(0);

fn chain(ctx: &mut HostCtx<'_, '_>, args: &[NativeVal]) -> Result<Option<NativeVal>, HostFault> {
    match args {
        [NativeVal::I32(n)] if *n > 0 => {
            let out = ctx.call(CHAIN, &[slot_i32(n - 1)])?;
            Ok(out.map(|s| NativeVal::I32(ret_i32(s))))
        }
        [NativeVal::I32(n)] => Ok(Some(NativeVal::I32(*n))),
        _ => Err(HostFault::Failed),
    }
}

fn square(_ctx: &mut HostCtx<'_, '_>, args: &[NativeVal]) -> Result<Option<NativeVal>, HostFault> {
    match args {
        [NativeVal::I32(v)] => Ok(Some(NativeVal::I32(v.wrapping_mul(*v)))),
        _ => Err(HostFault::Failed),
    }
}

fn sum_bytes(
    ctx: &mut HostCtx<'_, '_>,
    args: &[NativeVal],
) -> Result<Option<NativeVal>, HostFault> {
    match args {
        [NativeVal::Ptr(Some(r)), NativeVal::I32(_)] => {
            let region = ctx.region(*r).map_err(|_| HostFault::Failed)?;
            let sum: u32 = region.iter().map(|&b| u32::from(b)).sum();
            Ok(Some(NativeVal::I32(sum as i32)))
        }
        _ => Err(HostFault::Failed),
    }
}

fn bench_dispatch(c: &mut Criterion) {
    bench_scalar_roundtrip(c);
    bench_pointer_validation(c);
    bench_reentrant_chain(c);
}

fn bench_scalar_roundtrip(c: &mut Criterion) {
    let registry = Registry::load_table([TableEntry::new("square", "i:i", square)]).unwrap();
    let mut gate = Gate::new(registry, LinearMemory::new(64 * 1024), Limits::default());
    c.bench_function("scalar_roundtrip", |b| {
        b.iter(|| {
            let out = gate.dispatch(FuncId(0), &[slot_i32(black_box(7))]).unwrap();
            black_box(out);
        });
    });
}

fn bench_pointer_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("pointer_validation");
    for &len in &[16_i32, 256, 4096] {
        let mut registry = Registry::new();
        registry
            .register(
                Registration::new("sum", Signature::parse("pi:i").unwrap(), sum_bytes).ptr_policy(
                    0,
                    PtrPolicy {
                        len: RegionLen::Arg(1),
                        ..PtrPolicy::default()
                    },
                ),
            )
            .unwrap();
        let mut gate = Gate::new(registry, LinearMemory::new(64 * 1024), Limits::default());
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            b.iter(|| {
                let out = gate
                    .dispatch(FuncId(0), &[slot_ptr(GuestPtr(8)), slot_i32(len)])
                    .unwrap();
                black_box(out);
            });
        });
    }
    group.finish();
}

fn bench_reentrant_chain(c: &mut Criterion) {
    let registry = Registry::load_table([TableEntry::new("chain", "i:i", chain)]).unwrap();
    let mut gate = Gate::new(registry, LinearMemory::new(4096), Limits::default());
    let mut group = c.benchmark_group("reentrant_chain");
    for &depth in &[1_i32, 16, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter(|| {
                let out = gate.dispatch(CHAIN, &[slot_i32(depth)]).unwrap();
                black_box(out);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
