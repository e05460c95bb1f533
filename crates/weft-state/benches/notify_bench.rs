use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::{Value, json};
use weft_state::{Atom, Binding, History, ListStore, Producer, StateContext};

const FAN_OUT: &[usize] = &[1, 16, 256];

fn todo_atom(ctx: &StateContext) -> Atom {
    match Atom::from_json(ctx, json!({"text": "milk", "completed": false, "id": 1})) {
        Ok(atom) => atom,
        Err(err) => panic!("bench fixture: {err}"),
    }
}

/// One attribute write fanned out to N bindings, half of them scoped to an
/// untouched attribute.
fn atom_fan_out_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("atom_fan_out");
    for &n in FAN_OUT {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("set_completed", n), &n, |b, &n| {
            let ctx = StateContext::headless();
            let atom = todo_atom(&ctx);
            let bindings: Vec<Binding<bool>> = (0..n)
                .map(|i| {
                    let name = if i % 2 == 0 { "completed" } else { "text" };
                    Binding::new(
                        &ctx,
                        atom.attr(name),
                        Producer::value_only(|v: &Value| !v.is_null()),
                    )
                })
                .collect();
            let mut flag = false;
            b.iter(|| {
                flag = !flag;
                let _ = atom.set("completed", Value::Bool(black_box(flag)));
            });
            black_box(bindings.len());
        });
    }
    group.finish();
}

/// Many pushes inside one transaction versus outside.
fn list_transaction_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_push");
    for batched in [false, true] {
        let id = if batched { "transaction" } else { "direct" };
        group.bench_function(id, |b| {
            let ctx = StateContext::headless();
            let list = ListStore::new(&ctx, Vec::<u64>::with_capacity(1024));
            let _binding = Binding::new(&ctx, list.clone(), Producer::value_only(Vec::len));
            b.iter(|| {
                list.clear();
                if batched {
                    let _ = list.transaction(|l| {
                        for i in 0..64 {
                            l.push(black_box(i));
                        }
                        Ok::<_, ()>(())
                    });
                } else {
                    for i in 0..64 {
                        list.push(black_box(i));
                    }
                }
            });
        });
    }
    group.finish();
}

fn history_navigation_bench(c: &mut Criterion) {
    c.bench_function("history_go_to_version", |b| {
        let ctx = StateContext::headless();
        let history = History::initial(&ctx, 0u32, 128);
        for v in 1..=128 {
            history.present(v);
        }
        b.iter(|| {
            black_box(history.go_to_version(black_box(0)));
            black_box(history.go_to_version(black_box(128)));
        });
    });
}

criterion_group!(
    benches,
    atom_fan_out_bench,
    list_transaction_bench,
    history_navigation_bench
);
criterion_main!(benches);
