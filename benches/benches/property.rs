// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for `understory_dependency`.

use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::sync::Once;

use understory_dependency::{
    ObjectId, OverrideSource, Property, PropertyCollection, PropertyMetadataBuilder,
    PropertyRegistry, PropertyStore, PropertySystem,
};

const CLOCK: OverrideSource = OverrideSource(1);

fn bench_resolve(c: &mut Criterion) {
    static PRINT_SIZES: Once = Once::new();
    PRINT_SIZES.call_once(|| {
        eprintln!(
            "sizes: PropertyStore={} ErasedValue={} ObjectId={}",
            core::mem::size_of::<PropertyStore>(),
            core::mem::size_of::<understory_dependency::ErasedValue>(),
            core::mem::size_of::<ObjectId>(),
        );
    });

    let mut registry = PropertyRegistry::new();
    let element = registry.register_type("Element", None).unwrap();
    let width: Property<f64> = registry
        .register(element, "Width", PropertyMetadataBuilder::new(0.0_f64).build())
        .unwrap();
    let font_size: Property<f64> = registry
        .register(
            element,
            "FontSize",
            PropertyMetadataBuilder::new(12.0_f64).inherits(true).build(),
        )
        .unwrap();
    let text: Property<String> = registry
        .register(element, "Text", PropertyMetadataBuilder::new(String::new()).build())
        .unwrap();
    let children: Property<PropertyCollection<ObjectId>> = registry
        .register(
            element,
            "Children",
            PropertyMetadataBuilder::with_factory(PropertyCollection::new)
                .on_attach(|c, owner| c.attach(owner))
                .children()
                .build(),
        )
        .unwrap();

    let mut system = PropertySystem::new(&registry);

    // A small inheritance chain: 0 <- 1 <- ... <- N-1
    let chain_len: usize = 16;
    let mut chain = Vec::with_capacity(chain_len);
    for i in 0..chain_len {
        let node = system.create_object(element).unwrap();
        if i > 0 {
            system.set_parent(node, Some(chain[i - 1])).unwrap();
        }
        chain.push(node);
    }
    system.set(chain[0], font_size, 16.0).unwrap();
    let leaf = chain[chain_len - 1];

    let local = system.create_object(element).unwrap();
    system.set(local, width, 100.0).unwrap();
    system
        .set(local, text, "hello world hello world hello world".to_string())
        .unwrap();
    let animated = system.create_object(element).unwrap();
    system.set(animated, width, 100.0).unwrap();
    system.install_override(animated, width, 200.0, CLOCK).unwrap();
    let bare = system.create_object(element).unwrap();
    let materialized = system.create_object(element).unwrap();
    system.get_ref(materialized, children).unwrap();

    let mut group = c.benchmark_group("property/resolve");
    group.bench_function("local", |b| {
        b.iter(|| black_box(system.peek(local, width)));
    });
    group.bench_function("override", |b| {
        b.iter(|| black_box(system.peek(animated, width)));
    });
    group.bench_function("default", |b| {
        b.iter(|| black_box(system.peek(bare, width)));
    });
    group.bench_function(BenchmarkId::new("inherited", chain_len), |b| {
        b.iter(|| black_box(system.peek(leaf, font_size)));
    });
    group.bench_function("string_clone", |b| {
        b.iter(|| black_box(system.peek(local, text)));
    });
    group.bench_function("materialized_ref", |b| {
        b.iter(|| black_box(system.get_ref(materialized, children).map(|c| c.len())));
    });
    group.finish();
}

fn bench_mutate(c: &mut Criterion) {
    let mut registry = PropertyRegistry::new();
    let element = registry.register_type("Element", None).unwrap();
    let width: Property<f64> = registry
        .register(element, "Width", PropertyMetadataBuilder::new(0.0_f64).build())
        .unwrap();
    let width_cb: Property<f64> = registry
        .register(
            element,
            "WidthWithCallback",
            PropertyMetadataBuilder::new(0.0_f64)
                .on_changed(|_, _| Ok(()))
                .build(),
        )
        .unwrap();
    let children: Property<PropertyCollection<ObjectId>> = registry
        .register(
            element,
            "Children",
            PropertyMetadataBuilder::with_factory(PropertyCollection::new)
                .on_attach(|c, owner| c.attach(owner))
                .children()
                .build(),
        )
        .unwrap();

    let mut group = c.benchmark_group("property/mutate");

    let setup = || {
        let mut system = PropertySystem::new(&registry);
        let object = system.create_object(element).unwrap();
        (system, object)
    };

    group.bench_function("set/f64/no_callback", |b| {
        b.iter_batched(
            setup,
            |(mut system, object)| {
                black_box(system.set(object, width, 123.0)).unwrap();
                black_box(system);
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("set/f64/with_callback", |b| {
        b.iter_batched(
            setup,
            |(mut system, object)| {
                black_box(system.set(object, width_cb, 123.0)).unwrap();
                black_box(system);
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("set/f64/idempotent", |b| {
        let (mut system, object) = setup();
        system.set(object, width, 123.0).unwrap();
        b.iter(|| black_box(system.set(object, width, 123.0)));
    });

    group.bench_function("override/install_remove", |b| {
        let (mut system, object) = setup();
        system.set(object, width, 1.0).unwrap();
        b.iter(|| {
            system.install_override(object, width, 2.0, CLOCK).unwrap();
            black_box(system.remove_override(object, width, CLOCK))
        });
    });

    group.bench_function("collection/modify_push", |b| {
        b.iter_batched(
            || {
                let (mut system, object) = setup();
                let child = system.create_object(element).unwrap();
                (system, object, child)
            },
            |(mut system, object, child)| {
                black_box(system.modify(object, children, |c| c.push(child))).unwrap();
                black_box(system);
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("clone_for_animation/8_children", |b| {
        b.iter_batched(
            || {
                let (mut system, object) = setup();
                for _ in 0..8 {
                    let child = system.create_object(element).unwrap();
                    system.set(child, width, 5.0).unwrap();
                    system.modify(object, children, |c| c.push(child)).unwrap();
                }
                (system, object)
            },
            |(mut system, object)| {
                let clone = system.clone_for_animation(object).unwrap();
                black_box(clone);
                black_box(system);
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_resolve, bench_mutate);
criterion_main!(benches);
