use std::env;

use dotenvy::dotenv;
use esim_gateway::http::reqwest::default_dyn_transport;
use esim_gateway::provider::EsimProvider;
use esim_gateway::provider::esimgo::EsimGoProvider;
use esim_gateway::resilience::{ResilientClient, TransportConfig};
use esim_gateway::types::{PackageQuery, PageRequest};

fn load_env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[tokio::test]
#[ignore = "requires valid eSIM Go credentials"]
async fn esimgo_live_catalogue_and_balance() {
    let _ = dotenv();

    let Some(api_key) = load_env_var("ESIMGO_API_KEY") else {
        eprintln!("skip live test: ESIMGO_API_KEY missing");
        return;
    };
    let country = load_env_var("ESIMGO_LIVE_COUNTRY").unwrap_or_else(|| "FR".to_string());

    let transport = default_dyn_transport().expect("failed to build reqwest transport");
    let client = ResilientClient::new("esimgo", transport, &TransportConfig::default());
    let mut provider = EsimGoProvider::new(client, api_key).with_sandbox(true);
    if let Some(base_url) = load_env_var("ESIMGO_BASE_URL") {
        provider = provider.with_base_url(base_url);
    }

    let balance = provider.get_balance().await.expect("balance request failed");
    println!("balance: {} {}", balance.data.amount, balance.data.currency);

    let query = PackageQuery {
        country: Some(country.clone()),
        region: None,
        page: PageRequest::new(1, 10),
    };
    let packages = provider
        .list_packages(query)
        .await
        .expect("package listing failed");

    assert!(packages.items.len() <= 10);
    for package in &packages.items {
        assert!(
            package.countries.iter().any(|c| c.iso2 == country),
            "package {} does not cover {country}",
            package.id
        );
        println!("{} {} {} {}", package.id, package.name, package.price, package.currency);
    }
}
