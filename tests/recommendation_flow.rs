use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use screenpick::models::{MediaType, SearchFilters, UserSignals, WatchHistoryItem};
use screenpick::{
    Config, DetailService, RecommendationService, ResponseCache, SearchService, TmdbClient,
};

fn test_config(api_url: String) -> Config {
    Config {
        tmdb_api_key: "integration_key".to_string(),
        tmdb_api_url: api_url,
        request_timeout_ms: 2_000,
        retry_max_attempts: 3,
        retry_base_delay_ms: 10,
        breaker_failure_threshold: 5,
        breaker_reset_ms: 50,
        enhancement_deadline_ms: 500,
        trending_ttl: 60,
        search_ttl: 60,
        details_ttl: 60,
        suggestions_ttl: 60,
        recommendations_ttl: 60,
        proxy_ttl: 60,
        default_language: "en".to_string(),
    }
}

struct Services {
    recommendations: RecommendationService,
    search: SearchService,
    details: DetailService,
}

fn build_services(server: &MockServer) -> Services {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let config = test_config(server.uri());
    let provider = Arc::new(TmdbClient::new(&config).unwrap());
    let cache = Arc::new(ResponseCache::new());

    Services {
        recommendations: RecommendationService::new(provider.clone(), cache.clone(), &config),
        search: SearchService::new(provider.clone(), cache.clone(), &config),
        details: DetailService::new(provider, cache, &config),
    }
}

fn listing_item(id: u64, title: &str, release_date: &str) -> Value {
    json!({
        "id": id,
        "media_type": "movie",
        "title": title,
        "poster_path": format!("/{}.jpg", id),
        "genre_ids": [28, 878],
        "vote_average": 7.4,
        "vote_count": 5200,
        "popularity": 48.0,
        "release_date": release_date,
        "original_language": "en"
    })
}

fn listing(items: Vec<Value>) -> Value {
    let total = items.len();
    json!({
        "page": 1,
        "results": items,
        "total_pages": 1,
        "total_results": total
    })
}

fn watched(id: u64) -> WatchHistoryItem {
    WatchHistoryItem {
        id,
        media_type: MediaType::Movie,
        genre_ids: vec![28, 878],
        release_date: None,
        last_watched: None,
    }
}

#[tokio::test]
async fn empty_signals_feed_equals_trending_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trending/all/day"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![
            listing_item(603, "The Matrix", "1999-03-30"),
            listing_item(27205, "Inception", "2010-07-16"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let services = build_services(&server);

    let first = services
        .recommendations
        .home_feed("anon", &UserSignals::default())
        .await
        .unwrap();
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.items[0].id, 603);
    assert!(!first.from_cache);

    // The second request is answered by the trending cache entry.
    let second = services
        .recommendations
        .home_feed("anon", &UserSignals::default())
        .await
        .unwrap();
    assert_eq!(second.items, first.items);
    assert!(second.from_cache);
}

#[tokio::test]
async fn personalized_feed_excludes_watched_titles() {
    let server = MockServer::start().await;

    // Detail fetches for the deep taste signal.
    Mock::given(method("GET"))
        .and(path_regex(r"^/movie/\d+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "title": "Watched Movie",
            "genres": [{"id": 28, "name": "Action"}],
            "vote_average": 7.0,
            "release_date": "2012-06-01",
            "original_language": "en"
        })))
        .mount(&server)
        .await;

    // Discovery returns a watched title plus fresh candidates.
    Mock::given(method("GET"))
        .and(path_regex(r"^/discover/(movie|tv)$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![
            listing_item(1, "Watched Movie", "2012-06-01"),
            listing_item(550, "Fight Club", "1999-10-15"),
            listing_item(680, "Pulp Fiction", "1994-10-14"),
        ])))
        .mount(&server)
        .await;

    let services = build_services(&server);
    let signals = UserSignals {
        watch_history: vec![watched(1), watched(2)],
        list: Vec::new(),
    };

    let feed = services
        .recommendations
        .home_feed("alice", &signals)
        .await
        .unwrap();

    assert!(!feed.items.is_empty());
    assert!(feed.items.iter().all(|item| item.id != 1));
    assert!(feed.items.iter().any(|item| item.id == 550));
}

#[tokio::test]
async fn collection_member_reaches_top_of_item_recommendations() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/movie/603"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 603,
            "title": "The Matrix",
            "genres": [{"id": 28, "name": "Action"}, {"id": 878, "name": "Science Fiction"}],
            "vote_average": 8.2,
            "vote_count": 26000,
            "popularity": 95.0,
            "release_date": "1999-03-30",
            "original_language": "en",
            "belongs_to_collection": {"id": 2344, "name": "The Matrix Collection"},
            "production_companies": [{"id": 79, "name": "Village Roadshow Pictures"}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/collection/2344"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 2344,
            "name": "The Matrix Collection",
            "parts": [
                listing_item(603, "The Matrix", "1999-03-30"),
                listing_item(604, "The Matrix Reloaded", "2003-05-15"),
                listing_item(605, "The Matrix Revolutions", "2003-11-05")
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/movie/603/similar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(
            (700..712).map(|id| listing_item(id, "Similar", "2005-01-01")).collect(),
        )))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/movie/603/recommendations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(
            (800..812).map(|id| listing_item(id, "Recommended", "2008-01-01")).collect(),
        )))
        .mount(&server)
        .await;

    // Enhancement discoveries resolve empty.
    Mock::given(method("GET"))
        .and(path_regex(r"^/discover/(movie|tv)$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![])))
        .mount(&server)
        .await;

    let services = build_services(&server);
    let feed = services
        .recommendations
        .for_item(MediaType::Movie, 603, None, &UserSignals::default())
        .await
        .unwrap();

    // The reference item never recommends itself.
    assert!(feed.items.iter().all(|item| item.id != 603));

    let top_ids: Vec<u64> = feed.items.iter().take(3).map(|item| item.id).collect();
    assert!(
        top_ids.contains(&604) || top_ids.contains(&605),
        "expected a collection member in the top 3, got {:?}",
        top_ids
    );
}

#[tokio::test]
async fn empty_search_query_makes_no_network_call() {
    let server = MockServer::start().await;
    let services = build_services(&server);

    let response = services
        .search
        .search("", &SearchFilters::default(), 1, 20)
        .await
        .unwrap();

    assert!(response.results.is_empty());
    assert_eq!(response.pagination.page, 1);
    assert_eq!(response.pagination.total, 0);
    assert_eq!(response.pagination.total_pages, 0);
    assert!(!response.pagination.has_more);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn search_filters_and_paginates_multi_page_results() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search/multi"))
        .and(query_param("query", "saga"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "page": 1,
            "results": [
                listing_item(1, "Saga Origins", "2014-03-01"),
                listing_item(2, "Saga", "2016-03-01"),
                listing_item(3, "Saga Reborn", "2019-03-01"),
                listing_item(4, "Saga Forever", "2022-03-01"),
            ],
            "total_pages": 1,
            "total_results": 4
        })))
        .mount(&server)
        .await;

    let services = build_services(&server);
    let filters = SearchFilters {
        year_start: Some(2015),
        year_end: Some(2020),
        ..SearchFilters::default()
    };

    let response = services.search.search("saga", &filters, 1, 20).await.unwrap();

    assert_eq!(response.results.len(), 2);
    for item in &response.results {
        let year = item.release_year().unwrap();
        assert!((2015..=2020).contains(&year), "year {} outside filter", year);
    }
    // Exact title match ranks first.
    assert_eq!(response.results[0].title, "Saga");
}

#[tokio::test]
async fn modal_detail_bundle_is_cached_by_item() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/movie/27205"))
        .and(query_param(
            "append_to_response",
            "credits,keywords,images,videos,similar,recommendations",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 27205,
            "title": "Inception",
            "videos": {"results": []},
            "images": {"backdrops": []}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let services = build_services(&server);

    let first = services.details.modal(MediaType::Movie, 27205).await.unwrap();
    let second = services.details.modal(MediaType::Movie, 27205).await.unwrap();

    assert_eq!(first["title"], "Inception");
    assert_eq!(first, second);
}

#[tokio::test]
async fn proxy_passes_through_and_caches() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/genre/movie/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "genres": [{"id": 28, "name": "Action"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let services = build_services(&server);

    let first = services.details.proxy("genre/movie/list", &[]).await.unwrap();
    let second = services.details.proxy("genre/movie/list", &[]).await.unwrap();

    assert_eq!(first["genres"][0]["name"], "Action");
    assert_eq!(first, second);
}
