// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for ticket rendering and ESC/POS encoding in the
// printrelay-print crate.

use chrono::{TimeZone, Utc};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use serde_json::json;

use printrelay_core::types::{JobKind, PrintJob};
use printrelay_print::ticket::render;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A busy kitchen ticket: 40 items, every fifth one with a long note.
fn large_kot() -> PrintJob {
    let items: Vec<_> = (0..40)
        .map(|i| {
            let mut item = json!({"name": format!("Dish number {i}"), "quantity": i % 4 + 1});
            if i % 5 == 0 {
                item["notes"] = json!("no onion, extra spicy, serve with the starter course please");
            }
            item
        })
        .collect();
    PrintJob::new(
        "1",
        JobKind::KitchenOrder,
        json!({"restaurant": "Spice Route", "order_number": "A-1042", "table": "12", "items": items}),
    )
}

fn receipt() -> PrintJob {
    PrintJob::new(
        "2",
        JobKind::Receipt,
        json!({
            "restaurant": "Spice Route",
            "receipt_number": 12,
            "order_number": "A-1042",
            "items": [
                {"name": "Garlic Naan", "quantity": 2, "price": 1.5},
                {"name": "Lamb Rogan Josh", "quantity": 1, "price": 12.0},
                {"name": "Mango Lassi", "quantity": 3, "price": 3.25}
            ],
            "tax": 1.26, "tax_rate": 0.05,
            "total": "26.01",
            "payment_method": "card",
            "amount_paid": 26.01
        }),
    )
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Benchmark rendering the text layout of both ticket families.
fn bench_render(c: &mut Criterion) {
    let now = Utc.with_ymd_and_hms(2026, 3, 2, 19, 30, 0).unwrap();
    let kot = large_kot();
    let receipt = receipt();

    c.bench_function("render KOT (40 items)", |b| {
        b.iter(|| {
            let ticket = render(black_box(&kot), 32, now);
            assert!(ticket.is_ok());
        });
    });

    c.bench_function("render receipt", |b| {
        b.iter(|| {
            let ticket = render(black_box(&receipt), 32, now);
            assert!(ticket.is_ok());
        });
    });
}

/// Benchmark ESC/POS framing and CP437 encoding of a rendered ticket.
fn bench_escpos(c: &mut Criterion) {
    let now = Utc.with_ymd_and_hms(2026, 3, 2, 19, 30, 0).unwrap();
    let ticket = render(&large_kot(), 32, now).unwrap();

    c.bench_function("escpos encode (40 items)", |b| {
        b.iter(|| {
            let bytes = black_box(&ticket).escpos();
            black_box(bytes);
        });
    });
}

criterion_group!(benches, bench_render, bench_escpos);
criterion_main!(benches);
