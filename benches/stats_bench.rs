use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;
use time::{Date, Month};

use moneytrack::{auth::CurrentUser, categories, stats};
use moneytrack_core::{CategoryType, NewTransaction, NewUser, Period, StorageBackend};
use moneytrack_memory::InMemoryStorage;
use moneytrack_sqlite::SqliteStorage;

fn setup(storage: Arc<dyn StorageBackend>) -> (Arc<dyn StorageBackend>, CurrentUser) {
    categories::seed_defaults(&*storage).unwrap();
    let user = storage
        .create_user(&NewUser {
            username: "bench".to_string(),
            email: "bench@example.com".to_string(),
            password_hash: "x".to_string(),
        })
        .unwrap();
    let categories = storage.list_categories().unwrap();

    // A year of activity spread over every category
    for i in 0..1200u32 {
        let category = &categories[i as usize % categories.len()];
        let month = Month::try_from((i % 12) as u8 + 1).unwrap();
        let date = Date::from_calendar_date(2023, month, (i % 28) as u8 + 1).unwrap();
        let amount = match category.kind {
            CategoryType::Income => Decimal::new(250_000, 2),
            CategoryType::Expense => Decimal::new(1_999 + i as i64, 2),
        };
        storage
            .create_transaction(
                user.id,
                &NewTransaction {
                    category_id: category.id,
                    amount,
                    description: Some(format!("Bench {}", i)),
                    date,
                },
            )
            .unwrap();
    }

    let current = CurrentUser {
        id: user.id,
        username: user.username,
    };
    (storage, current)
}

fn bench_backend(c: &mut Criterion, name: &str, storage: Arc<dyn StorageBackend>) {
    let (storage, user) = setup(storage);
    let period = Period::new(6, 2023).unwrap();

    c.bench_function(&format!("{}_monthly_summary", name), |b| {
        b.iter(|| stats::monthly_summary(&*storage, &user, black_box(period)).unwrap())
    });
    c.bench_function(&format!("{}_spending_by_category", name), |b| {
        b.iter(|| stats::spending_by_category(&*storage, &user, black_box(period)).unwrap())
    });
    c.bench_function(&format!("{}_list_transactions", name), |b| {
        b.iter(|| storage.list_transactions(black_box(user.id)).unwrap())
    });
}

fn bench_memory(c: &mut Criterion) {
    bench_backend(c, "memory", Arc::new(InMemoryStorage::new()));
}

fn bench_sqlite(c: &mut Criterion) {
    bench_backend(c, "sqlite", Arc::new(SqliteStorage::new(":memory:").unwrap()));
}

criterion_group!(benches, bench_memory, bench_sqlite);
criterion_main!(benches);
