use bson::{Bson, Document, doc};
use serde::Deserialize;

use querylayer_core::{
    config::EngineConfig,
    filter::{FilterSpec, Operator},
    handle::StoreHandleBuilder,
    join::JoinSpec,
    page::PageCursor,
    query::QuerySpec,
    store::QueryStore,
};
use querylayer_memory::InMemoryStore;

async fn store_with(collection: &str, documents: Vec<Document>) -> QueryStore<InMemoryStore> {
    let handle = InMemoryStore::builder()
        .with_documents(collection, documents)
        .build()
        .await
        .unwrap();

    QueryStore::new(handle)
}

fn numbered(count: i32) -> Vec<Document> {
    (1..=count)
        .map(|seq| doc! { "seq": seq, "status": seq % 3 })
        .collect()
}

fn seqs(items: &[Document]) -> Vec<i32> {
    items
        .iter()
        .map(|item| item.get_i32("seq").unwrap())
        .collect()
}

fn newest_first() -> QuerySpec {
    QuerySpec::builder().sort("seq", "desc").build()
}

#[tokio::test]
async fn between_is_inclusive_on_both_ends() {
    let store = store_with(
        "products",
        [5, 10, 30, 50, 60]
            .into_iter()
            .map(|price| doc! { "price": price })
            .collect(),
    )
    .await;

    let query = QuerySpec::builder()
        .filter(FilterSpec::new().between("price", 10, 50))
        .sort("price", "asc")
        .build();
    let page = store
        .collection("products")
        .page(&query, PageCursor::new(1, 20))
        .await
        .unwrap();

    let prices: Vec<i32> = page
        .items
        .iter()
        .map(|item| item.get_i32("price").unwrap())
        .collect();
    assert_eq!(prices, vec![10, 30, 50]);
    assert_eq!(page.total, Some(3));
    assert_eq!(page.page_count, Some(1));
}

#[tokio::test]
async fn empty_like_operand_matches_everything() {
    let store = store_with(
        "posts",
        vec![doc! { "title": "Spring Sale" }, doc! { "title": "news" }],
    )
    .await;

    let query = QuerySpec::from(FilterSpec::new().with("title", Operator::Like, ""));
    let page = store
        .collection("posts")
        .page(&query, PageCursor::new(1, 20))
        .await
        .unwrap();

    assert_eq!(page.total, Some(2));
}

#[tokio::test]
async fn like_matches_case_insensitively() {
    let store = store_with(
        "posts",
        vec![doc! { "title": "Spring SALE" }, doc! { "title": "news" }],
    )
    .await;

    let query = QuerySpec::from(FilterSpec::new().with("title", "like", "sale"));
    let page = store
        .collection("posts")
        .page(&query, PageCursor::new(1, 20))
        .await
        .unwrap();

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].get_str("title").unwrap(), "Spring SALE");
}

#[tokio::test]
async fn or_branches_are_combined() {
    let store = store_with("items", numbered(9)).await;

    let spec = FilterSpec::from_json(&serde_json::json!({
        "or": [
            { "seq": 1 },
            { "seq": [">=", 8] },
        ]
    }))
    .unwrap();
    let query = QuerySpec::builder()
        .filter(spec)
        .sort("seq", "asc")
        .build();

    let page = store
        .collection("items")
        .page(&query, PageCursor::new(1, 20))
        .await
        .unwrap();

    assert_eq!(seqs(&page.items), vec![1, 8, 9]);
}

#[tokio::test]
async fn in_accepts_comma_separated_numbers() {
    let store = store_with("items", numbered(9)).await;

    let query = QuerySpec::builder()
        .filter(FilterSpec::new().with("seq", Operator::In, "2, 4，6"))
        .sort("seq", "asc")
        .build();
    let page = store
        .collection("items")
        .page(&query, PageCursor::new(1, 20))
        .await
        .unwrap();

    assert_eq!(seqs(&page.items), vec![2, 4, 6]);
}

#[tokio::test]
async fn unknown_operator_widens_instead_of_failing() {
    let store = store_with("items", numbered(5)).await;

    let query = QuerySpec::from(FilterSpec::new().with("seq", "approximately", 3));
    let page = store
        .collection("items")
        .page(&query, PageCursor::new(1, 20))
        .await
        .unwrap();

    assert_eq!(page.total, Some(5));
}

#[tokio::test]
async fn pages_are_consecutive_slices() {
    let store = store_with("items", numbered(25)).await;
    let items = store.collection("items");

    let first = items
        .page(&newest_first(), PageCursor::new(1, 10))
        .await
        .unwrap();
    let third = items
        .page(&newest_first(), PageCursor::new(3, 10))
        .await
        .unwrap();

    assert_eq!(seqs(&first.items), (16..=25).rev().collect::<Vec<_>>());
    assert_eq!(seqs(&third.items), (1..=5).rev().collect::<Vec<_>>());
    assert_eq!(first.total, Some(25));
    assert_eq!(first.page_count, Some(3));
}

#[tokio::test]
async fn pages_past_the_end_are_empty() {
    let store = store_with("items", numbered(25)).await;
    let items = store.collection("items");

    let page = items
        .page(&newest_first(), PageCursor::new(usize::MAX, 20))
        .await
        .unwrap();

    assert!(page.items.is_empty());
    assert_eq!(page.total, Some(25));
}

#[tokio::test]
async fn drift_skips_rows_inserted_ahead_of_the_page() {
    let store = store_with("items", numbered(30)).await;
    let items = store.collection("items");

    let first = items
        .page(&newest_first(), PageCursor::new(1, 10))
        .await
        .unwrap();
    assert_eq!(first.total, Some(30));

    items
        .insert_batch((31..=33).map(|seq| doc! { "seq": seq }).collect())
        .await
        .unwrap();

    let second = items
        .page(
            &newest_first(),
            PageCursor::new(2, 10).with_previous_total(first.total.unwrap()),
        )
        .await
        .unwrap();

    assert_eq!(second.total, Some(33));
    assert_eq!(seqs(&second.items), (11..=20).rev().collect::<Vec<_>>());
}

#[tokio::test]
async fn drift_is_ignored_without_totals() {
    let store = store_with("items", numbered(33)).await;

    let page = store
        .collection("items")
        .page(
            &newest_first(),
            PageCursor::new(2, 10)
                .with_total(false)
                .with_previous_total(30),
        )
        .await
        .unwrap();

    assert_eq!(page.total, None);
    assert_eq!(page.page_count, None);
    assert_eq!(seqs(&page.items), (14..=23).rev().collect::<Vec<_>>());
}

#[tokio::test]
async fn page_size_is_clamped_and_defaulted() {
    let store = store_with("items", numbered(1200)).await;
    let items = store.collection("items");

    let oversized = items
        .page(&QuerySpec::new(), PageCursor::new(1, 5000))
        .await
        .unwrap();
    assert_eq!(oversized.size, 1000);
    assert_eq!(oversized.items.len(), 1000);
    assert_eq!(oversized.page_count, Some(2));

    let unsized_page = items
        .page(&QuerySpec::new(), PageCursor::new(0, 0))
        .await
        .unwrap();
    assert_eq!(unsized_page.page, 1);
    assert_eq!(unsized_page.size, 20);
    assert_eq!(unsized_page.items.len(), 20);
}

#[tokio::test]
async fn configured_limits_replace_the_defaults() {
    let handle = InMemoryStore::builder()
        .with_documents("items", numbered(50))
        .build()
        .await
        .unwrap();
    let config = EngineConfig::builder()
        .with_max_size(15)
        .with_default_size(5)
        .build();
    let store = QueryStore::with_config(handle, config);
    let items = store.collection("items");

    let page = items
        .page(&QuerySpec::new(), PageCursor::new(1, 100))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 15);

    let page = items
        .page(&QuerySpec::new(), PageCursor::new(1, 0))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 5);
}

#[tokio::test]
async fn projection_limits_returned_fields() {
    let store = store_with(
        "posts",
        vec![doc! { "title": "a", "body": "long text", "price": 3 }],
    )
    .await;

    let query = QuerySpec::builder().fields("title, price").build();
    let page = store
        .collection("posts")
        .page(&query, PageCursor::new(1, 10))
        .await
        .unwrap();

    let item = &page.items[0];
    assert!(item.contains_key("_id"));
    assert!(item.contains_key("title"));
    assert!(item.contains_key("price"));
    assert!(!item.contains_key("body"));
}

#[tokio::test]
async fn unwound_pages_count_array_elements() {
    let store = store_with(
        "orders",
        vec![
            doc! { "no": 1, "lines": [ { "sku": "a", "qty": 1 }, { "sku": "b", "qty": 5 } ] },
            doc! { "no": 2, "lines": [ { "sku": "c", "qty": 7 } ] },
            doc! { "no": 3, "lines": [] },
        ],
    )
    .await;
    let orders = store.collection("orders");

    let query = QuerySpec::builder()
        .filter(FilterSpec::new().with("lines.qty", ">", 2))
        .sort("lines.qty", "desc")
        .build();
    let page = orders
        .page_by_array("lines", &query, PageCursor::new(1, 10))
        .await
        .unwrap();

    assert_eq!(page.total, Some(2));
    let skus: Vec<&str> = page
        .items
        .iter()
        .map(|item| item.get_document("lines").unwrap().get_str("sku").unwrap())
        .collect();
    assert_eq!(skus, vec!["c", "b"]);

    let nothing = orders
        .page_by_array(
            "lines",
            &QuerySpec::from(FilterSpec::new().eq("lines.sku", "zzz")),
            PageCursor::new(1, 10),
        )
        .await
        .unwrap();
    assert_eq!(nothing.total, Some(0));
    assert!(nothing.items.is_empty());
}

#[tokio::test]
async fn joined_pages_flatten_to_one() {
    let handle = InMemoryStore::builder()
        .with_documents(
            "posts",
            vec![
                doc! { "_id": 1, "title": "first", "authorId": 10 },
                doc! { "_id": 2, "title": "orphan", "authorId": 99 },
            ],
        )
        .with_documents("authors", vec![doc! { "_id": 10, "name": "Ann" }])
        .build()
        .await
        .unwrap();
    let store = QueryStore::new(handle);
    let posts = store.collection("posts");

    let join = JoinSpec::new("authors", "authorId", "_id", "author");
    let query = QuerySpec::builder().sort("_id", "asc").build();
    let page = posts
        .page_joined(&join, &query, PageCursor::new(1, 10))
        .await
        .unwrap();

    assert_eq!(page.total, Some(2));
    assert_eq!(
        page.items[0].get_document("author").unwrap(),
        &doc! { "_id": 10, "name": "Ann" }
    );
    assert_eq!(page.items[1].get_document("author").unwrap(), &Document::new());

    let many = posts
        .page_joined(&join.clone().one_to_many(), &query, PageCursor::new(1, 10))
        .await
        .unwrap();
    assert_eq!(many.items[1].get_array("author").unwrap(), &Vec::<Bson>::new());
}

#[tokio::test]
async fn joined_pages_filter_on_joined_fields() {
    let handle = InMemoryStore::builder()
        .with_documents(
            "posts",
            vec![
                doc! { "_id": 1, "authorId": 10 },
                doc! { "_id": 2, "authorId": 11 },
            ],
        )
        .with_documents(
            "authors",
            vec![
                doc! { "_id": 10, "name": "Ann" },
                doc! { "_id": 11, "name": "Bo" },
            ],
        )
        .build()
        .await
        .unwrap();
    let store = QueryStore::new(handle);

    let join = JoinSpec::new("authors", "authorId", "_id", "author");
    let page = store
        .collection("posts")
        .page_joined(
            &join,
            &QuerySpec::from(FilterSpec::new().eq("author.name", "Bo")),
            PageCursor::new(1, 10),
        )
        .await
        .unwrap();

    assert_eq!(page.total, Some(1));
    assert_eq!(page.items[0].get_i32("_id").unwrap(), 2);
}

#[tokio::test]
async fn fetch_all_reads_every_chunk() {
    let store = store_with("items", numbered(45)).await;

    let all = store
        .collection("items")
        .get_all_big(&QuerySpec::builder().sort("seq", "asc").build(), 10)
        .await
        .unwrap();

    assert_eq!(seqs(&all), (1..=45).collect::<Vec<_>>());
}

#[derive(Debug, Deserialize, PartialEq)]
struct Item {
    seq: i32,
    status: i32,
}

#[tokio::test]
async fn pages_deserialize_into_typed_rows() {
    let store = store_with("items", numbered(3)).await;

    let page = store
        .collection("items")
        .page(
            &QuerySpec::builder().fields("seq,status").sort("seq", "asc").build(),
            PageCursor::new(1, 2),
        )
        .await
        .unwrap()
        .into_typed::<Item>()
        .unwrap();

    assert_eq!(page.items, vec![Item { seq: 1, status: 1 }, Item { seq: 2, status: 2 }]);
    assert_eq!(page.page_count, Some(2));
}
