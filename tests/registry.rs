mod support;

use std::sync::Arc;

use esim_gateway::config::{Credential, GatewayConfig, ProviderConfig, ProviderKind};
use esim_gateway::error::{GatewayError, UnavailableReason};
use esim_gateway::http::HttpResponse;
use esim_gateway::resilience::CircuitState;
use esim_gateway::types::Operation;
use esim_gateway::{ProviderRegistry, build_registry_from_config};
use serde_json::json;
use support::{ScriptedTransport, Step, transport_config};

fn esimgo(name: &str, base_url: &str) -> ProviderConfig {
    ProviderConfig {
        name: name.to_string(),
        kind: ProviderKind::Esimgo,
        credential: Credential::ApiKey {
            key: format!("{name}-key"),
        },
        sandbox: false,
        base_url: Some(base_url.to_string()),
    }
}

fn esimcard(base_url: &str) -> ProviderConfig {
    ProviderConfig {
        name: "esimcard".to_string(),
        kind: ProviderKind::Esimcard,
        credential: Credential::Login {
            email: "reseller@example.test".to_string(),
            password: "s3cret".to_string(),
        },
        sandbox: true,
        base_url: Some(base_url.to_string()),
    }
}

fn registry(transport: &Arc<ScriptedTransport>, providers: Vec<ProviderConfig>) -> ProviderRegistry {
    let config = GatewayConfig {
        transport: transport_config(0, 2),
        providers,
    };
    build_registry_from_config(&config, transport.clone()).expect("registry")
}

#[tokio::test(start_paused = true)]
async fn resolves_configured_providers_by_name() {
    let transport = ScriptedTransport::new();
    transport.push_json(200, json!({"balance": 99.5, "currency": "EUR"}));
    let registry = registry(
        &transport,
        vec![
            esimgo("esimgo", "https://api.esimgo.test/v2.5"),
            esimcard("https://esimcard.test/api"),
        ],
    );
    assert_eq!(transport.attempts(), 0);

    let provider = registry.resolve("EsimGo").expect("resolve");
    let balance = provider.get_balance().await.expect("balance");

    assert_eq!(balance.data.amount, 99.5);
    assert_eq!(balance.data.currency, "EUR");
    assert_eq!(balance.provider.provider, "esimgo");
    assert_eq!(
        transport.last_request().headers.get("X-API-Key").map(String::as_str),
        Some("esimgo-key")
    );
}

#[tokio::test(start_paused = true)]
async fn unknown_names_are_rejected() {
    let transport = ScriptedTransport::new();
    let registry = registry(
        &transport,
        vec![esimgo("esimgo", "https://api.esimgo.test/v2.5")],
    );

    match registry.resolve("zetexa") {
        Err(GatewayError::UnknownProvider { name }) => assert_eq!(name, "zetexa"),
        Err(other) => panic!("unexpected error type: {other:?}"),
        Ok(provider) => panic!("resolved unexpected provider {}", provider.name()),
    }
    assert!(registry.capabilities("zetexa").is_err());
}

#[tokio::test(start_paused = true)]
async fn capability_queries_cover_every_provider() {
    let transport = ScriptedTransport::new();
    let registry = registry(
        &transport,
        vec![
            esimgo("esimgo", "https://api.esimgo.test/v2.5"),
            esimcard("https://esimcard.test/api"),
        ],
    );

    assert_eq!(
        registry.providers_supporting(Operation::GetBalance),
        vec!["esimcard".to_string(), "esimgo".to_string()]
    );
    assert_eq!(
        registry.providers_supporting(Operation::RevokeBundle),
        vec!["esimgo".to_string()]
    );
    let esimcard_operations = registry.supported_operations("esimcard").expect("operations");
    assert_eq!(esimcard_operations, Operation::REQUIRED.to_vec());
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn providers_on_the_same_host_share_a_circuit() {
    let transport = ScriptedTransport::new();
    transport.always(Step::Respond(HttpResponse {
        status: 503,
        headers: Default::default(),
        body: Vec::new(),
    }));
    let registry = registry(
        &transport,
        vec![
            esimgo("esimgo-eu", "https://api.esimgo.test/v2.5"),
            esimgo("esimgo-us", "https://api.esimgo.test/v2.5"),
        ],
    );
    let eu = registry.resolve("esimgo-eu").expect("eu");
    let us = registry.resolve("esimgo-us").expect("us");

    for _ in 0..2 {
        assert!(matches!(
            eu.get_balance().await,
            Err(GatewayError::ProviderUnavailable {
                reason: UnavailableReason::RetriesExhausted,
                ..
            })
        ));
    }

    match us.get_balance().await {
        Err(GatewayError::ProviderUnavailable { reason, .. }) => {
            assert_eq!(reason, UnavailableReason::CircuitOpen);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(transport.attempts(), 2);

    let circuits = registry.circuit_states();
    assert_eq!(circuits["api.esimgo.test"].state, CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn open_circuit_does_not_affect_other_hosts() {
    let transport = ScriptedTransport::new();
    transport
        .push_status(503)
        .push_status(503)
        .push_json(200, json!({"status": true, "access_token": "tok-1"}))
        .push_json(200, json!({"status": true, "data": {"balance": 7}}));
    let registry = registry(
        &transport,
        vec![
            esimgo("esimgo", "https://api.esimgo.test/v2.5"),
            esimcard("https://esimcard.test/api"),
        ],
    );
    let esimgo = registry.resolve("esimgo").expect("esimgo");
    let esimcard = registry.resolve("esimcard").expect("esimcard");

    for _ in 0..2 {
        assert!(esimgo.get_balance().await.is_err());
    }
    let balance = esimcard.get_balance().await.expect("esimcard balance");

    assert_eq!(balance.data.amount, 7.0);
    let circuits = registry.circuit_states();
    assert_eq!(circuits["api.esimgo.test"].state, CircuitState::Open);
    assert_eq!(circuits["esimcard.test"].state, CircuitState::Closed);
}
