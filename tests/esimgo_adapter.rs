mod support;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use esim_gateway::error::{GatewayError, ResourceKind, UnavailableReason};
use esim_gateway::http::HttpResponse;
use esim_gateway::provider::EsimProvider;
use esim_gateway::provider::esimgo::EsimGoProvider;
use esim_gateway::resilience::ResilientClient;
use esim_gateway::types::{
    BundleStatus, CreateOrderRequest, EsimStatus, OrderQuery, OrderStatus, PackageQuery,
    PageRequest, RefundRequest,
};
use serde_json::json;
use support::{ScriptedTransport, Step, body_json, query_value, transport_config};

const BASE_URL: &str = "https://api.esimgo.test/v2.5";
const ICCID: &str = "8944538531001234567";

fn provider(transport: &Arc<ScriptedTransport>, sandbox: bool) -> EsimGoProvider {
    let client = ResilientClient::new("esimgo", transport.clone(), &transport_config(2, 5));
    EsimGoProvider::new(client, "test-api-key")
        .with_base_url(BASE_URL)
        .with_sandbox(sandbox)
}

#[tokio::test(start_paused = true)]
async fn get_package_sends_api_key_and_maps_bundle() {
    let transport = ScriptedTransport::new();
    transport.push_json(
        200,
        json!({
            "name": "esim_1GB_7D_GB_V2",
            "description": "eSIM, 1GB, 7 Days, United Kingdom, V2",
            "countries": [{
                "country": {"iso": "GB", "name": "United Kingdom", "region": "Europe"},
                "networks": [{"name": "EE", "brandName": "EE", "speeds": ["4G", "5G"]}]
            }],
            "dataAmount": 1000,
            "duration": 7,
            "price": 1.83,
            "speed": ["4G", "5G"]
        }),
    );
    let provider = provider(&transport, false);

    let package = provider.get_package("esim_1GB_7D_GB_V2").await.expect("package");

    assert_eq!(package.provider.provider, "esimgo");
    assert!(!package.provider.sandbox);
    assert_eq!(package.data.id, "esim_1GB_7D_GB_V2");
    assert_eq!(package.data.data_mb, Some(1000));
    assert_eq!(package.data.countries[0].iso2, "GB");
    assert_eq!(package.data.networks[0].name, "EE");

    let request = transport.last_request();
    assert_eq!(request.headers.get("X-API-Key").map(String::as_str), Some("test-api-key"));
    assert_eq!(transport.calls(), vec!["GET /v2.5/catalogue/bundle/esim_1GB_7D_GB_V2"]);
}

#[tokio::test(start_paused = true)]
async fn missing_package_is_not_found_with_the_requested_id() {
    let transport = ScriptedTransport::new();
    transport.push_json(404, json!({"message": "Bundle not found"}));
    let provider = provider(&transport, false);

    match provider.get_package("esim_unknown").await {
        Err(GatewayError::NotFound { provider, kind, id }) => {
            assert_eq!(provider, "esimgo");
            assert_eq!(kind, ResourceKind::Package);
            assert_eq!(id, "esim_unknown");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn malformed_identifiers_never_reach_the_vendor() {
    let transport = ScriptedTransport::new();
    let provider = provider(&transport, false);

    match provider.get_esim("../organisation").await {
        Err(GatewayError::InvalidRequest { message }) => assert!(message.contains("iccid")),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn sandbox_orders_are_validated_not_executed() {
    let transport = ScriptedTransport::new();
    transport.push_json(
        200,
        json!({
            "status": "VALIDATED",
            "total": 1.83,
            "currency": "USD",
            "order": [{"item": "esim_1GB_7D_GB_V2", "quantity": 1, "pricePerUnit": 1.83}]
        }),
    );
    let provider = provider(&transport, true);

    let order = provider
        .create_order(CreateOrderRequest::single("esim_1GB_7D_GB_V2", 1))
        .await
        .expect("validated order");

    assert!(order.provider.sandbox);
    assert_eq!(order.data.id, None);
    assert_eq!(order.data.status, OrderStatus::Pending);
    assert_eq!(order.data.total, Some(1.83));

    let body = body_json(&transport.last_request());
    assert_eq!(body["type"], "validate");
    assert_eq!(body["assign"], true);
    assert_eq!(body["order"][0]["item"], "esim_1GB_7D_GB_V2");
    assert_eq!(body["order"][0]["quantity"], 1);
}

#[tokio::test(start_paused = true)]
async fn live_order_returns_reference_and_activation_codes() {
    let transport = ScriptedTransport::new();
    transport.push_json(
        200,
        json!({
            "orderReference": "a1b2c3d4-0000-4000-8000-000000000001",
            "status": "Completed",
            "statusMessage": "Order completed: 1 eSIMs assigned",
            "total": 3.66,
            "currency": "USD",
            "createdDate": "2024-03-01T10:00:00.000Z",
            "assigned": true,
            "order": [{
                "item": "esim_1GB_7D_GB_V2",
                "quantity": 2,
                "pricePerUnit": 1.83,
                "subTotal": 3.66,
                "esims": [
                    {"iccid": ICCID, "matchingId": "ABC-123", "smdpAddress": "rsp.esim.test"},
                    {"iccid": "8944538531001234568", "lpaString": "LPA:1$rsp.esim.test$XYZ"}
                ]
            }]
        }),
    );
    let provider = provider(&transport, false);

    let mut request = CreateOrderRequest::single("esim_1GB_7D_GB_V2", 2);
    request.reference = Some("checkout-42".to_string());
    let order = provider.create_order(request).await.expect("order");

    let order = order.data;
    assert_eq!(order.id.as_deref(), Some("a1b2c3d4-0000-4000-8000-000000000001"));
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.reference.as_deref(), Some("checkout-42"));
    assert_eq!(
        order.created_at,
        Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
    );
    let esims = &order.items[0].esims;
    assert_eq!(esims.len(), 2);
    assert_eq!(esims[0].activation_code.as_deref(), Some("LPA:1$rsp.esim.test$ABC-123"));
    assert_eq!(esims[1].activation_code.as_deref(), Some("LPA:1$rsp.esim.test$XYZ"));
    assert_eq!(body_json(&transport.last_request())["type"], "transaction");
}

#[tokio::test(start_paused = true)]
async fn order_submission_is_never_retried() {
    let transport = ScriptedTransport::new();
    transport.push_status(503).push_json(200, json!({"orderReference": "late"}));
    let provider = provider(&transport, false);

    match provider
        .create_order(CreateOrderRequest::single("esim_1GB_7D_GB_V2", 1))
        .await
    {
        Err(GatewayError::ProviderUnavailable { reason, .. }) => {
            assert_eq!(reason, UnavailableReason::RetriesExhausted);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn insufficient_funds_is_a_conflict() {
    let transport = ScriptedTransport::new();
    transport.push_json(
        400,
        json!({"code": "INSUFFICIENT_FUNDS", "message": "Organisation balance too low"}),
    );
    let provider = provider(&transport, false);

    match provider
        .create_order(CreateOrderRequest::single("esim_1GB_7D_GB_V2", 1))
        .await
    {
        Err(GatewayError::Conflict { message, .. }) => {
            assert_eq!(message, "Organisation balance too low");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn stored_order_without_reference_is_a_provider_error() {
    let transport = ScriptedTransport::new();
    transport
        .push_json(200, json!({"status": "Completed"}))
        .push_json(
            200,
            json!({
                "orders": [
                    {"orderReference": "b1c2", "status": "Completed", "order": [{"item": "esim_1GB_7D_GB_V2"}]},
                    {"status": "Completed", "order": []}
                ],
                "rows": 2
            }),
        );
    let provider = provider(&transport, false);

    match provider.get_order("ORD-1").await {
        Err(GatewayError::ProviderError { provider, message, .. }) => {
            assert_eq!(provider, "esimgo");
            assert!(message.contains("order reference"), "unexpected message: {message}");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    match provider.list_orders(OrderQuery::default()).await {
        Err(GatewayError::ProviderError { .. }) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(transport.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn live_order_without_reference_is_a_provider_error() {
    let transport = ScriptedTransport::new();
    transport.push_json(
        200,
        json!({"status": "Completed", "order": [{"item": "esim_1GB_7D_GB_V2", "quantity": 1}]}),
    );
    let provider = provider(&transport, false);

    match provider
        .create_order(CreateOrderRequest::single("esim_1GB_7D_GB_V2", 1))
        .await
    {
        Err(GatewayError::ProviderError { .. }) => {}
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn countries_drain_every_catalogue_page() {
    let transport = ScriptedTransport::new();
    transport
        .push_json(
            200,
            json!({
                "bundles": [
                    {"name": "esim_1GB_7D_GB_V2", "countries": [{"iso": "GB", "name": "United Kingdom", "region": "Europe"}]},
                    {"name": "esim_1GB_7D_FR_V2", "countries": [{"iso": "FR", "name": "France", "region": "Europe"}]}
                ],
                "total": 3
            }),
        )
        .push_json(
            200,
            json!({
                "bundles": [
                    {"name": "esim_1GB_7D_JP_V2", "countries": [{"iso": "JP", "name": "Japan", "region": "Asia"}]}
                ],
                "total": 3
            }),
        );
    let provider = provider(&transport, false);

    let countries = provider.list_countries().await.expect("countries");

    let names: Vec<&str> = countries.items.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["France", "Japan", "United Kingdom"]);
    assert!(!countries.pagination.has_more);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(query_value(&requests[0], "page").as_deref(), Some("1"));
    assert_eq!(query_value(&requests[1], "page").as_deref(), Some("2"));
    assert_eq!(query_value(&requests[1], "perPage").as_deref(), Some("1000"));
}

#[tokio::test(start_paused = true)]
async fn oversized_catalogue_is_reported_as_partial() {
    let transport = ScriptedTransport::new();
    transport.always(Step::Respond(HttpResponse::json(
        200,
        &json!({
            "bundles": [
                {"name": "esim_1GB_7D_GB_V2", "countries": [{"iso": "GB", "name": "United Kingdom", "region": "Europe"}]}
            ],
            "total": 100_000
        }),
    )));
    let provider = provider(&transport, false);

    let countries = provider.list_countries().await.expect("countries");

    assert_eq!(transport.attempts(), 50);
    assert_eq!(countries.items.len(), 1);
    assert!(countries.pagination.has_more);
    assert_eq!(countries.pagination.total, None);
}

#[tokio::test(start_paused = true)]
async fn regions_group_catalogue_countries() {
    let transport = ScriptedTransport::new();
    transport.push_json(
        200,
        json!({
            "bundles": [
                {"name": "esim_1GB_7D_GB_V2", "countries": [{"iso": "GB", "name": "United Kingdom", "region": "Europe"}]},
                {"name": "esim_1GB_7D_EU_V2", "countries": [
                    {"iso": "FR", "name": "France", "region": "Europe"},
                    {"iso": "DE", "name": "Germany", "region": "Europe"}
                ]},
                {"name": "esim_1GB_7D_JP_V2", "countries": [{"iso": "JP", "name": "Japan", "region": "Asia"}]}
            ],
            "total": 3
        }),
    );
    let provider = provider(&transport, false);

    let regions = provider.list_regions().await.expect("regions");

    let summary: Vec<(&str, Vec<&str>)> = regions
        .items
        .iter()
        .map(|r| (r.name.as_str(), r.countries.iter().map(String::as_str).collect()))
        .collect();
    assert_eq!(
        summary,
        vec![("Asia", vec!["JP"]), ("Europe", vec!["DE", "FR", "GB"])]
    );
    assert_eq!(regions.items[1].id, "europe");
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn package_listing_forwards_filters_and_reports_more_pages() {
    let transport = ScriptedTransport::new();
    transport.push_json(
        200,
        json!({
            "bundles": [{"name": "esim_1GB_7D_GB_V2", "countries": [{"iso": "GB"}], "price": 1.83}],
            "total": 12
        }),
    );
    let provider = provider(&transport, false);

    let packages = provider
        .list_packages(PackageQuery {
            country: Some("GB".to_string()),
            region: None,
            page: PageRequest::new(1, 1),
        })
        .await
        .expect("packages");

    assert_eq!(packages.items.len(), 1);
    assert_eq!(packages.pagination.total, Some(12));
    assert!(packages.pagination.has_more);
    let request = transport.last_request();
    assert_eq!(query_value(&request, "countries").as_deref(), Some("GB"));
    assert_eq!(query_value(&request, "region"), None);
}

#[tokio::test(start_paused = true)]
async fn order_history_filters_by_creation_window() {
    let transport = ScriptedTransport::new();
    transport.push_json(200, json!({"orders": [null, {"orderReference": "o-1", "status": "Completed"}], "rows": 1}));
    let provider = provider(&transport, false);

    let after = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let before = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    let orders = provider
        .list_orders(OrderQuery {
            created_after: Some(after),
            created_before: Some(before),
            ..OrderQuery::default()
        })
        .await
        .expect("orders");

    assert_eq!(orders.items.len(), 1);
    assert_eq!(orders.items[0].id.as_deref(), Some("o-1"));
    let created_at = query_value(&transport.last_request(), "createdAt").expect("createdAt");
    assert_eq!(
        created_at,
        format!("gte:{}&lte:{}", after.to_rfc3339(), before.to_rfc3339())
    );
}

#[tokio::test(start_paused = true)]
async fn esim_details_map_status_and_bundles() {
    let transport = ScriptedTransport::new();
    transport.push_json(
        200,
        json!({
            "iccid": ICCID,
            "status": "ENABLE",
            "smdpAddress": "rsp.esim.test",
            "matchingId": "ABC-123",
            "bundles": [{"name": "esim_1GB_7D_GB_V2", "status": "ACTIVE", "initialAmount": 1000, "remainingAmount": 250}]
        }),
    );
    let provider = provider(&transport, false);

    let esim = provider.get_esim(ICCID).await.expect("esim").data;

    assert_eq!(esim.status, EsimStatus::Active);
    assert_eq!(esim.activation_code.as_deref(), Some("LPA:1$rsp.esim.test$ABC-123"));
    assert_eq!(esim.bundles[0].status, BundleStatus::Active);
    assert_eq!(esim.bundles[0].data_used_mb(), Some(750));
}

#[tokio::test(start_paused = true)]
async fn usage_aggregates_bundles_and_rejects_unknown_bundle() {
    let bundles = json!({
        "bundles": [
            {"name": "esim_1GB_7D_GB_V2", "status": "ACTIVE", "initialAmount": 1000, "remainingAmount": 400},
            {"name": "esim_2GB_30D_GB_V2", "status": "EXPIRED", "initialAmount": 2000, "remainingAmount": 0}
        ]
    });
    let transport = ScriptedTransport::new();
    transport
        .push_json(200, bundles.clone())
        .push_json(200, bundles);
    let provider = provider(&transport, false);

    let usage = provider.get_usage(ICCID, None).await.expect("usage").data;
    assert_eq!(usage.data_total_mb, Some(3000));
    assert_eq!(usage.data_remaining_mb, Some(400));
    assert_eq!(usage.data_used_mb, Some(2600));
    assert!(usage.active);

    match provider.get_usage(ICCID, Some("esim_5GB_30D_GB_V2")).await {
        Err(GatewayError::NotFound { kind, id, .. }) => {
            assert_eq!(kind, ResourceKind::Bundle);
            assert_eq!(id, "esim_5GB_30D_GB_V2");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn refunds_and_revocations_use_dedicated_endpoints() {
    let transport = ScriptedTransport::new();
    transport
        .push_json(200, json!({"success": true, "refundId": 991, "amount": "1.83"}))
        .push_json(200, json!({"message": "Bundle revoked", "refundAmount": 1.83, "currency": "USD"}));
    let provider = provider(&transport, false);

    let refund = provider
        .request_refund(RefundRequest {
            iccid: Some(ICCID.to_string()),
            bundle_name: Some("esim_1GB_7D_GB_V2".to_string()),
            order_reference: None,
            reason: Some("customer request".to_string()),
        })
        .await
        .expect("refund")
        .data;
    assert!(refund.accepted);
    assert_eq!(refund.refund_id.as_deref(), Some("991"));
    assert_eq!(refund.amount, Some(1.83));

    let revocation = provider
        .revoke_bundle(ICCID, "esim_1GB_7D_GB_V2")
        .await
        .expect("revocation")
        .data;
    assert_eq!(revocation.refunded_amount, Some(1.83));

    assert_eq!(
        transport.calls(),
        vec![
            "POST /v2.5/inventory/refund".to_string(),
            format!("DELETE /v2.5/esims/{ICCID}/bundles/esim_1GB_7D_GB_V2"),
        ]
    );
    assert_eq!(body_json(&transport.requests()[0])["bundleName"], "esim_1GB_7D_GB_V2");
}

#[tokio::test(start_paused = true)]
async fn empty_refund_request_is_rejected_locally() {
    let transport = ScriptedTransport::new();
    let provider = provider(&transport, false);

    let result = provider
        .request_refund(RefundRequest {
            iccid: None,
            bundle_name: None,
            order_reference: None,
            reason: Some("no target".to_string()),
        })
        .await;
    assert!(matches!(result, Err(GatewayError::InvalidRequest { .. })));
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn transactions_are_unsupported_without_a_network_call() {
    let transport = ScriptedTransport::new();
    let provider = provider(&transport, false);

    match provider.list_transactions(PageRequest::default()).await {
        Err(GatewayError::UnsupportedOperation { provider, operation }) => {
            assert_eq!(provider, "esimgo");
            assert_eq!(operation.as_str(), "list_transactions");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(transport.attempts(), 0);
}
