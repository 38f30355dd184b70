//! Benchmarks for the per-request engine path.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Map, Value};
use sqlroutes::engine::{
    cache_key, derive_count_sql, is_valid_sql_query, transform_rows, validate_placeholders,
    FieldFilter, HttpMethod, KeyCase, ResponseShape, RouteDefinition, RouteTable,
};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

const SIMPLE_SELECT: &str = "SELECT id, name FROM users ORDER BY id";

const FILTERED_SELECT: &str = "SELECT id, name, email FROM users \
    WHERE department_id = $1 AND status = $2 ORDER BY created_at DESC";

const JOIN_SELECT: &str = "SELECT u.name, o.total, o.created_at \
    FROM users u \
    JOIN orders o ON u.id = o.user_id \
    WHERE o.total > $1 AND u.region = $2 AND o.status = $3 \
    ORDER BY o.created_at DESC \
    LIMIT 50";

const CTE_SELECT: &str = "WITH active_users AS (\
        SELECT id, name FROM users WHERE status = 'active'\
    ) \
    SELECT a.name, COUNT(o.id) AS order_count \
    FROM active_users a JOIN orders o ON a.id = o.user_id \
    GROUP BY a.name \
    ORDER BY order_count DESC";

fn route_table(size: usize) -> RouteTable {
    let definitions = (0..size)
        .map(|i| {
            let src = format!(
                "path = \"/resource{i}/:id/items/:item_id\"\n\
                 sql = \"SELECT * FROM items WHERE owner_id = $1 AND id = $2\"\n\
                 params = [\"id\", \"item_id\"]\n"
            );
            toml::from_str::<RouteDefinition>(&src).expect("valid route")
        })
        .collect();
    RouteTable::new(definitions).expect("valid table")
}

fn sample_rows(count: usize) -> Vec<Map<String, Value>> {
    (0..count)
        .map(|i| {
            let row = json!({
                "id": i,
                "first_name": "Ada",
                "last_name": "Lovelace",
                "password_hash": "x",
                "created_at": "2024-01-01T00:00:00Z",
                "home_address": {"street_name": "Main", "postal_code": "12345"},
            });
            match row {
                Value::Object(map) => map,
                _ => unreachable!(),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Benchmark groups
// ---------------------------------------------------------------------------

fn bench_route_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_matching");

    for size in [10usize, 100, 500] {
        let table = route_table(size);
        let last = format!("/resource{}/42/items/7", size - 1);
        group.bench_with_input(BenchmarkId::new("last_route", size), &last, |b, path| {
            b.iter(|| table.match_route(HttpMethod::Get, black_box(path)))
        });
        group.bench_with_input(BenchmarkId::new("miss", size), &size, |b, _| {
            b.iter(|| table.match_route(HttpMethod::Get, black_box("/nowhere/1")))
        });
    }

    group.finish();
}

fn bench_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("validation");

    let cases = [
        ("simple", SIMPLE_SELECT, 0usize),
        ("filtered", FILTERED_SELECT, 2),
        ("join", JOIN_SELECT, 3),
        ("cte", CTE_SELECT, 0),
    ];

    for (name, sql, arity) in cases {
        let params: Vec<String> = (0..arity).map(|i| format!("p{i}")).collect();
        group.bench_with_input(BenchmarkId::new("keywords", name), &sql, |b, sql| {
            b.iter(|| is_valid_sql_query(black_box(sql)))
        });
        group.bench_with_input(BenchmarkId::new("placeholders", name), &sql, |b, sql| {
            b.iter(|| validate_placeholders(black_box(sql), black_box(&params)))
        });
    }

    group.finish();
}

fn bench_count_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("count_derivation");

    for (name, sql) in [
        ("simple", SIMPLE_SELECT),
        ("filtered", FILTERED_SELECT),
        ("join", JOIN_SELECT),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &sql, |b, sql| {
            b.iter(|| derive_count_sql(black_box(sql)))
        });
    }

    group.finish();
}

fn bench_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform");

    let shape = ResponseShape {
        filter: FieldFilter::Exclude(vec!["password_hash".to_string()]),
        case: KeyCase::CamelCase,
        wrapper: None,
    };

    for count in [10usize, 100, 1000] {
        let rows = sample_rows(count);
        group.bench_with_input(BenchmarkId::new("camel_case", count), &rows, |b, rows| {
            b.iter(|| transform_rows(black_box(rows.clone()), &shape))
        });
    }

    group.finish();
}

fn bench_cache_key(c: &mut Criterion) {
    let query: Vec<(String, String)> = [("page", "3"), ("limit", "25"), ("q", "a b&c")]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    c.bench_function("cache_key", |b| {
        b.iter(|| cache_key("GET", black_box("/users"), black_box(&query)))
    });
}

criterion_group!(
    benches,
    bench_route_matching,
    bench_validation,
    bench_count_derivation,
    bench_transform,
    bench_cache_key
);
criterion_main!(benches);
