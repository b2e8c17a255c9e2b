//! Integration tests for the match director
//!
//! These tests drive the whole flow across module boundaries:
//! - Match function packing pool tickets for the director's profiles
//! - Allocation against a game server directory
//! - Assignment reporting back to the backend
//! - The HTTP clients against stand-in Open Match and discover servers
//! - Director totals surfacing through health checks

// Modules for organizing tests
mod fixtures;

use match_director::allocator::{AllocationSelector, DiscoverConfig, DiscoverDirectory};
use match_director::config::AppConfig;
use match_director::director::{
    AssignmentReporter, Director, DirectorConfig, StaticProfiles, WorldRegionProfiles,
};
use match_director::matchfunction::{MatchFunctionService, PlayerCapacityMatchMaker};
use match_director::openmatch::messages::{
    FetchMatchesResponse, StreamFrame, ASSIGN_TICKETS_PATH, FETCH_MATCHES_PATH,
};
use match_director::openmatch::{
    FunctionConfig, FunctionType, HttpBackendClient, MatchmakingBackend, MockMatchmakingBackend,
    OpenMatchEndpoint, StaticQueryService,
};
use match_director::service::health::DirectorProbe;
use match_director::service::{HealthCheck, HealthStatus, ServiceMonitor, ServiceRole};
use match_director::types::Match;
use mockito::Matcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

use fixtures::{ready_server, tickets, world_profile, FleetDirectory, LoopbackBackend};

fn director_config() -> DirectorConfig {
    DirectorConfig {
        interval: "1s".to_string(),
        fetch_timeout: Duration::from_secs(2),
        grace_period: Duration::from_millis(10),
    }
}

/// Director wired to a backend and directory, with its own reporter and selector
fn build_director(
    profiles: StaticProfiles,
    backend: Arc<dyn MatchmakingBackend>,
    directory: Arc<FleetDirectory>,
) -> Director {
    let selector = Arc::new(AllocationSelector::new(directory));
    let reporter = Arc::new(AssignmentReporter::new(backend.clone()));
    Director::new(director_config(), &profiles, backend, selector, reporter).unwrap()
}

#[tokio::test]
async fn test_match_function_to_assignment_workflow() {
    let query = StaticQueryService::new()
        .with_pool("pool_mode_Dune", tickets("dune", "Dune", 25))
        .with_pool("pool_mode_Orion", tickets("orion", "Orion", 10));
    let function = Arc::new(MatchFunctionService::new(
        Arc::new(query),
        Arc::new(PlayerCapacityMatchMaker::new(10)),
    ));
    let backend = Arc::new(LoopbackBackend::new(function));
    let directory = Arc::new(FleetDirectory::new(vec![
        ready_server("dune-1", "Dune", "us-east-1", "10.0.0.1", 7000, Some((10, 0))),
        ready_server("orion-1", "Orion", "us-west-2", "10.0.0.2", 7100, None),
    ]));

    let profiles = StaticProfiles::new(vec![
        world_profile("Dune", "us-east-1"),
        world_profile("Orion", "us-west-2"),
    ]);
    let director = build_director(profiles, backend.clone(), directory.clone());

    let (_tx, rx) = watch::channel(false);
    let summary = director.tick(&rx).await;

    // 25 Dune tickets make two full matches of 10; Orion makes one
    assert_eq!(summary.profiles, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.matches, 3);
    assert_eq!(summary.tickets_assigned, 30);

    let assigned = backend.assigned_groups();
    assert_eq!(assigned.len(), 3);
    let dune: Vec<_> = assigned
        .iter()
        .filter(|g| g.ticket_ids[0].starts_with("dune"))
        .collect();
    assert_eq!(dune.len(), 2);
    assert!(dune.iter().all(|g| g.connection() == "10.0.0.1:7000"));
    assert!(assigned
        .iter()
        .filter(|g| g.ticket_ids[0].starts_with("orion"))
        .all(|g| g.connection() == "10.0.0.2:7100"));

    // Every lookup used the filter the profile carried
    let queries = directory.queries();
    assert_eq!(queries.len(), 3);
    assert!(queries
        .iter()
        .all(|f| f.fields.get("status.state").map(String::as_str) == Some("Ready")));

    let stats = director.stats().read().unwrap().clone();
    assert_eq!(stats.matches_fetched, 3);
    assert_eq!(stats.groups_resolved, 3);
    assert_eq!(stats.tickets_assigned, 30);

    println!("✅ Match function to assignment workflow test passed");
}

#[tokio::test]
async fn test_matches_without_servers_are_not_reported() {
    let query = StaticQueryService::new().with_pool("pool_mode_Nova", tickets("nova", "Nova", 10));
    let function = Arc::new(MatchFunctionService::new(
        Arc::new(query),
        Arc::new(PlayerCapacityMatchMaker::new(5)),
    ));
    let backend = Arc::new(LoopbackBackend::new(function));
    let directory = Arc::new(FleetDirectory::new(vec![ready_server(
        "dune-1",
        "Dune",
        "us-east-1",
        "10.0.0.1",
        7000,
        None,
    )]));

    let profiles = StaticProfiles::new(vec![world_profile("Nova", "us-east-1")]);
    let director = build_director(profiles, backend.clone(), directory);

    let (_tx, rx) = watch::channel(false);
    let summary = director.tick(&rx).await;

    assert_eq!(summary.matches, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.tickets_assigned, 0);
    assert!(backend.assigned_groups().is_empty());
}

#[tokio::test]
async fn test_first_fit_skips_full_servers() {
    let query = StaticQueryService::new().with_pool("pool_mode_Dune", tickets("dune", "Dune", 10));
    let function = Arc::new(MatchFunctionService::new(
        Arc::new(query),
        Arc::new(PlayerCapacityMatchMaker::new(10)),
    ));
    let backend = Arc::new(LoopbackBackend::new(function));
    let directory = Arc::new(FleetDirectory::new(vec![
        ready_server("dune-full", "Dune", "us-east-1", "10.0.0.1", 7000, Some((10, 5))),
        ready_server("dune-open", "Dune", "us-east-1", "10.0.0.9", 7009, Some((16, 2))),
    ]));

    let profiles = StaticProfiles::new(vec![world_profile("Dune", "us-east-1")]);
    let director = build_director(profiles, backend.clone(), directory);

    let (_tx, rx) = watch::channel(false);
    director.tick(&rx).await;

    // First fit skips the server without room for ten more players
    let assigned = backend.assigned_groups();
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].connection(), "10.0.0.9:7009");
}

#[tokio::test]
async fn test_http_backend_and_discover_directory_round_trip() {
    let mut openmatch = mockito::Server::new_async().await;
    let mut discover = mockito::Server::new_async().await;

    let profile = world_profile("Pandora", "us-west-1");
    let proposals: Vec<Match> = (0..2)
        .map(|n| Match {
            match_id: format!("profile-{}-time-1-{}", profile.name, n),
            match_profile: profile.name.clone(),
            match_function: "player_capacity_matchfunc".to_string(),
            tickets: tickets(&format!("m{}", n), "Pandora", 3),
            extensions: profile.extensions.clone(),
        })
        .collect();
    let body = proposals
        .into_iter()
        .map(|matched| serde_json::to_string(&StreamFrame::result(FetchMatchesResponse { matched })).unwrap())
        .collect::<Vec<_>>()
        .join("\n");

    let fetch = openmatch
        .mock("POST", FETCH_MATCHES_PATH)
        .match_body(Matcher::Regex("world_based_profile_Pandora_us-west-1".to_string()))
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;
    let assign = openmatch
        .mock("POST", ASSIGN_TICKETS_PATH)
        .match_body(Matcher::Regex("192.168.1.20:7654".to_string()))
        .with_status(200)
        .with_body(r#"{"failures":[{"ticket_id":"m1-2","cause":"TICKET_NOT_FOUND"}]}"#)
        .create_async()
        .await;
    let servers = discover
        .mock("GET", "/api/v1/gameservers")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("labels".into(), "region=us-west-1,world=Pandora".into()),
            Matcher::UrlEncoded("fields".into(), "status.state=Ready".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"[{"name":"gs-no-address","status":{"state":"Ready","address":""}},
                {"name":"gs-pandora","status":{"state":"Ready","address":"192.168.1.20","ports":[{"name":"default","port":7654}],"players":{"count":0,"capacity":10}}}]"#,
        )
        .expect(2)
        .create_async()
        .await;

    let backend: Arc<dyn MatchmakingBackend> = Arc::new(
        HttpBackendClient::new(
            OpenMatchEndpoint::new(&openmatch.url()),
            FunctionConfig {
                host: "mmf".to_string(),
                port: 50502,
                function_type: FunctionType::Rest,
            },
        )
        .unwrap(),
    );
    let directory = DiscoverDirectory::new(&DiscoverConfig {
        url: discover.url(),
        timeout_ms: 2000,
    })
    .unwrap();
    let selector = Arc::new(AllocationSelector::new(Arc::new(directory)));
    let reporter = Arc::new(AssignmentReporter::new(backend.clone()));
    let director = Director::new(
        director_config(),
        &StaticProfiles::new(vec![profile]),
        backend,
        selector,
        reporter,
    )
    .unwrap();

    let (_tx, rx) = watch::channel(false);
    let summary = director.tick(&rx).await;

    fetch.assert_async().await;
    assign.assert_async().await;
    servers.assert_async().await;

    assert_eq!(summary.failed, 0);
    assert_eq!(summary.matches, 2);
    // Six tickets sent, one rejected by the backend
    assert_eq!(summary.tickets_assigned, 5);
    assert_eq!(director.stats().read().unwrap().assignment_failures, 1);
}

#[tokio::test]
async fn test_backend_error_fails_profile_without_stopping_tick() {
    let mut openmatch = mockito::Server::new_async().await;
    openmatch
        .mock("POST", FETCH_MATCHES_PATH)
        .with_status(503)
        .with_body("backend unavailable")
        .create_async()
        .await;

    let backend: Arc<dyn MatchmakingBackend> = Arc::new(
        HttpBackendClient::new(
            OpenMatchEndpoint::new(&openmatch.url()),
            FunctionConfig {
                host: "mmf".to_string(),
                port: 50502,
                function_type: FunctionType::Rest,
            },
        )
        .unwrap(),
    );
    let profiles = StaticProfiles::new(vec![
        world_profile("Dune", "us-east-1"),
        world_profile("Nova", "us-east-2"),
    ]);
    let director = build_director(profiles, backend, Arc::new(FleetDirectory::default()));

    let (_tx, rx) = watch::channel(false);
    let summary = director.tick(&rx).await;

    assert_eq!(summary.profiles, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(director.stats().read().unwrap().profile_failures, 2);
}

#[tokio::test]
async fn test_generated_profiles_fetch_every_world_and_region() {
    let backend = Arc::new(MockMatchmakingBackend::new());
    let selector = Arc::new(AllocationSelector::new(Arc::new(FleetDirectory::default())));
    let reporter = Arc::new(AssignmentReporter::new(backend.clone()));
    let director = Director::new(
        director_config(),
        &WorldRegionProfiles::new(),
        backend.clone(),
        selector,
        reporter,
    )
    .unwrap();

    let (_tx, rx) = watch::channel(false);
    let summary = director.tick(&rx).await;

    assert_eq!(summary.profiles, 16);
    assert_eq!(summary.succeeded, 16);
    let mut calls = backend.fetch_calls();
    calls.sort();
    calls.dedup();
    assert_eq!(calls.len(), 16);
    assert!(calls.contains(&"world_based_profile_Orion_us-west-2".to_string()));
}

#[tokio::test]
async fn test_director_totals_reach_health_check() {
    let query = StaticQueryService::new().with_pool("pool_mode_Dune", tickets("dune", "Dune", 4));
    let function = Arc::new(MatchFunctionService::new(
        Arc::new(query),
        Arc::new(PlayerCapacityMatchMaker::new(4)),
    ));
    let backend = Arc::new(LoopbackBackend::new(function));
    let directory = Arc::new(FleetDirectory::new(vec![ready_server(
        "dune-1",
        "Dune",
        "us-east-1",
        "10.0.0.1",
        7000,
        None,
    )]));
    let director = build_director(
        StaticProfiles::new(vec![world_profile("Dune", "us-east-1")]),
        backend,
        directory,
    );

    let (_tx, rx) = watch::channel(false);
    director.tick(&rx).await;

    let monitor = ServiceMonitor::new(
        "match-director",
        ServiceRole::Director,
        Arc::new(RwLock::new(true)),
    )
    .with_director(DirectorProbe {
        stats: director.stats(),
        interval: director.interval(),
        profiles: director.profiles().len(),
    });

    let health = HealthCheck::check(&monitor).await.unwrap();
    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.stats.ticks_completed, 1);
    assert_eq!(health.stats.tickets_assigned, 4);
    assert_eq!(health.stats.profiles, 1);
}

#[tokio::test]
async fn test_configured_director_runs_until_cancelled() {
    let config = AppConfig::from_toml(
        r#"
        [director]
        interval = "50ms"
        fetch_timeout_ms = 200
        grace_period_ms = 10
        "#,
    )
    .unwrap();

    let backend = Arc::new(MockMatchmakingBackend::new());
    let selector = Arc::new(AllocationSelector::new(Arc::new(FleetDirectory::default())));
    let reporter = Arc::new(AssignmentReporter::new(backend.clone()));
    let director = Arc::new(
        Director::new(
            config.director_config(),
            &StaticProfiles::new(vec![world_profile("Dune", "us-east-1")]),
            backend.clone(),
            selector,
            reporter,
        )
        .unwrap(),
    );
    assert_eq!(director.interval(), Duration::from_millis(50));

    let (tx, rx) = watch::channel(false);
    let running = {
        let director = director.clone();
        tokio::spawn(async move { director.run(rx).await })
    };

    tokio::time::sleep(Duration::from_millis(180)).await;
    tx.send_replace(true);

    let result = tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("director stops after cancellation")
        .unwrap();
    tokio_test::assert_ok!(result);
    assert!(backend.fetch_calls().len() >= 2);
}
