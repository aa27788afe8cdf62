use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::error::{GatewayError, ResourceKind};
use crate::normalize::Subject;
use crate::provider::{
    AuthConfig, EsimProvider, ProviderIdentity, aggregate_usage, decode_payload,
    validate_identifier, validate_order,
};
use crate::resilience::{ApiCall, ResilientClient};
use crate::types::{
    ApplyBundleRequest, ApplyBundleResult, AssignedBundle, Balance, BundleRevocation,
    CapabilityDescriptor, Country, CreateOrderRequest, ESim, Envelope, EsimHistoryEvent,
    EsimQuery, Listing, Order, OrderQuery, Package, PackageQuery, PageRequest, ProviderMetadata,
    Refund, RefundRequest, Region, Usage,
};

use super::error::map_call_error;
use super::response::{
    collect_countries, collect_regions, map_balance, map_bundle, map_esim, map_history,
    map_order, map_order_esim, map_package, map_refund, map_revocation, map_validated_order,
    unwrap_record,
};
use super::types::{
    EsimGoAssignedBundle, EsimGoBundle, EsimGoBundleList, EsimGoCatalogue, EsimGoEsim,
    EsimGoEsimList, EsimGoHistory, EsimGoOrder, EsimGoOrderList, EsimGoOrganisation,
    EsimGoRefund, EsimGoRevocation,
};
use super::{API_KEY_HEADER, DEFAULT_BASE_URL, PROVIDER_NAME};

/// Upper bound on catalogue pages fetched when draining it for countries and regions.
const MAX_CATALOGUE_PAGES: u32 = 50;

/// eSIM Go provider.
pub struct EsimGoProvider {
    identity: ProviderIdentity,
    client: ResilientClient,
}

impl EsimGoProvider {
    /// Creates a live provider with the default base URL.
    pub fn new(client: ResilientClient, api_key: impl Into<String>) -> Self {
        Self {
            identity: ProviderIdentity {
                name: PROVIDER_NAME,
                live_base_url: DEFAULT_BASE_URL.to_string(),
                sandbox_base_url: DEFAULT_BASE_URL.to_string(),
                sandbox: false,
                auth: AuthConfig::ApiKey {
                    header: API_KEY_HEADER.to_string(),
                    key: api_key.into(),
                },
            },
            client,
        }
    }

    /// Switches to sandbox mode, where orders are validated but not executed.
    pub fn with_sandbox(mut self, sandbox: bool) -> Self {
        self.identity.sandbox = sandbox;
        self
    }

    /// Points both environments at a custom base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.identity.live_base_url = base_url.clone();
        self.identity.sandbox_base_url = base_url;
        self
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata::new(PROVIDER_NAME, self.identity.sandbox)
    }

    fn order_type(&self) -> &'static str {
        if self.identity.sandbox {
            "validate"
        } else {
            "transaction"
        }
    }

    fn authorize(&self, call: ApiCall) -> ApiCall {
        match &self.identity.auth {
            AuthConfig::ApiKey { header, key } => call.header(header.clone(), key.clone()),
            _ => call,
        }
    }

    async fn send(&self, call: ApiCall, subject: Option<&Subject>) -> Result<Value, GatewayError> {
        self.client
            .execute(self.authorize(call))
            .await
            .map_err(|err| map_call_error(err, subject))
    }

    async fn get(&self, path: &str, subject: Option<&Subject>) -> Result<Value, GatewayError> {
        self.send(ApiCall::get(self.identity.endpoint(path)), subject)
            .await
    }

    async fn fetch_catalogue_page(
        &self,
        page: PageRequest,
        country: Option<&str>,
        region: Option<&str>,
    ) -> Result<EsimGoCatalogue, GatewayError> {
        let call = ApiCall::get(self.identity.endpoint("/catalogue"))
            .query("page", page.page)
            .query("perPage", page.limit)
            .query_opt("countries", country)
            .query_opt("region", region);
        decode_payload(PROVIDER_NAME, self.send(call, None).await?)
    }

    /// Walks every catalogue page and maps the bundles. The flag is set when the page
    /// bound was reached before the vendor ran out of bundles.
    async fn full_catalogue(&self) -> Result<(Vec<Package>, bool), GatewayError> {
        let mut packages = Vec::new();
        let mut request = PageRequest::new(1, PageRequest::MAX_LIMIT);
        loop {
            let page = self.fetch_catalogue_page(request, None, None).await?;
            let returned = page.bundles.len();
            for bundle in page.bundles {
                packages.push(map_package(bundle)?);
            }
            let exhausted = match page.total {
                Some(total) => packages.len() as u64 >= total,
                None => returned < request.limit as usize,
            };
            if returned == 0 || exhausted {
                return Ok((packages, false));
            }
            if request.page >= MAX_CATALOGUE_PAGES {
                warn!(
                    provider = PROVIDER_NAME,
                    pages = request.page,
                    bundles = packages.len(),
                    total = page.total,
                    "catalogue page limit reached, result is partial"
                );
                return Ok((packages, true));
            }
            request.page += 1;
        }
    }

    fn catalogue_listing<T>(&self, items: Vec<T>, truncated: bool) -> Listing<T> {
        if truncated {
            Listing::truncated(items, self.metadata())
        } else {
            Listing::complete(items, self.metadata())
        }
    }

    async fn assigned_bundles(&self, iccid: &str) -> Result<Vec<AssignedBundle>, GatewayError> {
        validate_identifier("iccid", iccid)?;
        let subject = Subject::new(ResourceKind::ESim, iccid);
        let body = self
            .get(&format!("/esims/{iccid}/bundles"), Some(&subject))
            .await?;
        let list: EsimGoBundleList = decode_payload(PROVIDER_NAME, body)?;
        list.bundles.into_iter().map(map_bundle).collect()
    }
}

#[async_trait]
impl EsimProvider for EsimGoProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn identity(&self) -> &ProviderIdentity {
        &self.identity
    }

    fn capabilities(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            supports_transactions: false,
            supports_refunds: true,
            supports_bundle_revocation: true,
            supports_esim_history: true,
        }
    }

    async fn list_countries(&self) -> Result<Listing<Country>, GatewayError> {
        let (packages, truncated) = self.full_catalogue().await?;
        Ok(self.catalogue_listing(collect_countries(&packages), truncated))
    }

    async fn list_regions(&self) -> Result<Listing<Region>, GatewayError> {
        let (packages, truncated) = self.full_catalogue().await?;
        Ok(self.catalogue_listing(collect_regions(&packages), truncated))
    }

    async fn list_packages(&self, query: PackageQuery) -> Result<Listing<Package>, GatewayError> {
        let page = query.page.normalized();
        let catalogue = self
            .fetch_catalogue_page(page, query.country.as_deref(), query.region.as_deref())
            .await?;
        let packages = catalogue
            .bundles
            .into_iter()
            .map(map_package)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Listing::page(packages, page, catalogue.total, self.metadata()))
    }

    async fn get_package(&self, package_id: &str) -> Result<Envelope<Package>, GatewayError> {
        validate_identifier("package_id", package_id)?;
        let subject = Subject::new(ResourceKind::Package, package_id);
        let body = self
            .get(&format!("/catalogue/bundle/{package_id}"), Some(&subject))
            .await?;
        let bundle: EsimGoBundle = decode_payload(PROVIDER_NAME, unwrap_record(body, "bundle"))?;
        Ok(Envelope::new(map_package(bundle)?, self.metadata()))
    }

    async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<Envelope<Order>, GatewayError> {
        validate_order(&request)?;
        let lines: Vec<Value> = request
            .items
            .iter()
            .map(|item| {
                let mut line = Map::new();
                line.insert("type".into(), json!("bundle"));
                line.insert("item".into(), json!(item.package_id));
                line.insert("quantity".into(), json!(item.quantity));
                line.insert("allowReassign".into(), json!(request.allow_reassign));
                if !request.iccids.is_empty() {
                    line.insert("iccids".into(), json!(request.iccids));
                }
                Value::Object(line)
            })
            .collect();
        let payload = json!({
            "type": self.order_type(),
            "assign": request.assign,
            "order": lines,
        });

        let call = ApiCall::post(self.identity.endpoint("/orders")).json(payload);
        let body = self.send(call, None).await?;
        let order: EsimGoOrder = decode_payload(PROVIDER_NAME, body)?;
        let mut order = if self.identity.sandbox {
            map_validated_order(order)?
        } else {
            map_order(order)?
        };
        order.reference = request.reference;
        Ok(Envelope::new(order, self.metadata()))
    }

    async fn get_order(&self, order_id: &str) -> Result<Envelope<Order>, GatewayError> {
        validate_identifier("order_id", order_id)?;
        let subject = Subject::new(ResourceKind::Order, order_id);
        let body = self
            .get(&format!("/orders/{order_id}"), Some(&subject))
            .await?;
        let order: EsimGoOrder = decode_payload(PROVIDER_NAME, body)?;
        Ok(Envelope::new(map_order(order)?, self.metadata()))
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Listing<Order>, GatewayError> {
        let page = query.page.normalized();
        let created_at = match (query.created_after, query.created_before) {
            (Some(after), Some(before)) => Some(format!(
                "gte:{}&lte:{}",
                after.to_rfc3339(),
                before.to_rfc3339()
            )),
            (Some(after), None) => Some(format!("gte:{}", after.to_rfc3339())),
            (None, Some(before)) => Some(format!("lte:{}", before.to_rfc3339())),
            (None, None) => None,
        };
        let call = ApiCall::get(self.identity.endpoint("/orders"))
            .query("includeIccids", query.include_esims)
            .query("page", page.page)
            .query("limit", page.limit)
            .query_opt("createdAt", created_at);
        let list: EsimGoOrderList = decode_payload(PROVIDER_NAME, self.send(call, None).await?)?;
        let orders = list
            .orders
            .into_iter()
            .flatten()
            .map(map_order)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Listing::page(orders, page, list.rows, self.metadata()))
    }

    async fn list_esims(&self, query: EsimQuery) -> Result<Listing<ESim>, GatewayError> {
        let page = query.page.normalized();
        if let Some(iccid) = &query.iccid {
            validate_identifier("iccid", iccid)?;
        }
        let call = ApiCall::get(self.identity.endpoint("/esims"))
            .query("page", page.page)
            .query("perPage", page.limit)
            .query_opt("iccid", query.iccid.as_deref());
        let list: EsimGoEsimList = decode_payload(PROVIDER_NAME, self.send(call, None).await?)?;
        let esims = list
            .esims
            .into_iter()
            .map(map_esim)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Listing::page(esims, page, list.total, self.metadata()))
    }

    async fn get_esim(&self, iccid: &str) -> Result<Envelope<ESim>, GatewayError> {
        validate_identifier("iccid", iccid)?;
        let subject = Subject::new(ResourceKind::ESim, iccid);
        let body = self.get(&format!("/esims/{iccid}"), Some(&subject)).await?;
        let esim: EsimGoEsim = decode_payload(PROVIDER_NAME, unwrap_record(body, "esim"))?;
        Ok(Envelope::new(map_esim(esim)?, self.metadata()))
    }

    async fn apply_bundle(
        &self,
        request: ApplyBundleRequest,
    ) -> Result<Envelope<ApplyBundleResult>, GatewayError> {
        validate_identifier("package_id", &request.package_id)?;
        if request.quantity == 0 {
            return Err(GatewayError::invalid_request("quantity must be positive"));
        }
        let mut line = json!({
            "type": "bundle",
            "item": request.package_id,
            "quantity": request.quantity,
        });
        if let Some(iccid) = &request.iccid {
            validate_identifier("iccid", iccid)?;
            line["iccids"] = json!([iccid]);
        }
        let payload = json!({
            "type": self.order_type(),
            "assign": true,
            "order": [line],
        });

        let call = ApiCall::post(self.identity.endpoint("/esims/apply")).json(payload);
        let order: EsimGoOrder = decode_payload(PROVIDER_NAME, self.send(call, None).await?)?;
        let result = ApplyBundleResult {
            order_reference: order.order_reference,
            esims: order
                .order
                .into_iter()
                .flat_map(|line| line.esims)
                .filter_map(map_order_esim)
                .collect(),
        };
        Ok(Envelope::new(result, self.metadata()))
    }

    async fn list_esim_bundles(
        &self,
        iccid: &str,
    ) -> Result<Listing<AssignedBundle>, GatewayError> {
        let bundles = self.assigned_bundles(iccid).await?;
        Ok(Listing::complete(bundles, self.metadata()))
    }

    async fn get_bundle_status(
        &self,
        iccid: &str,
        bundle: &str,
    ) -> Result<Envelope<AssignedBundle>, GatewayError> {
        validate_identifier("iccid", iccid)?;
        validate_identifier("bundle", bundle)?;
        let subject = Subject::new(ResourceKind::Bundle, bundle);
        let body = self
            .get(&format!("/esims/{iccid}/bundles/{bundle}"), Some(&subject))
            .await?;
        let assigned: EsimGoAssignedBundle =
            decode_payload(PROVIDER_NAME, unwrap_record(body, "bundle"))?;
        Ok(Envelope::new(map_bundle(assigned)?, self.metadata()))
    }

    async fn get_usage(
        &self,
        iccid: &str,
        bundle: Option<&str>,
    ) -> Result<Envelope<Usage>, GatewayError> {
        let bundles = self.assigned_bundles(iccid).await?;
        let usage = aggregate_usage(PROVIDER_NAME, iccid, bundle, &bundles)?;
        Ok(Envelope::new(usage, self.metadata()))
    }

    async fn get_balance(&self) -> Result<Envelope<Balance>, GatewayError> {
        let body = self.get("/organisation", None).await?;
        let organisation: EsimGoOrganisation =
            decode_payload(PROVIDER_NAME, unwrap_record(body, "organisation"))?;
        Ok(Envelope::new(map_balance(organisation)?, self.metadata()))
    }

    async fn request_refund(
        &self,
        request: RefundRequest,
    ) -> Result<Envelope<Refund>, GatewayError> {
        if request.is_empty() {
            return Err(GatewayError::invalid_request(
                "refund needs an iccid, a bundle name or an order reference",
            ));
        }
        let mut payload = Map::new();
        let fields = [
            ("iccid", &request.iccid),
            ("bundleName", &request.bundle_name),
            ("orderReference", &request.order_reference),
            ("reason", &request.reason),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                payload.insert(key.to_string(), json!(value));
            }
        }

        let call = ApiCall::post(self.identity.endpoint("/inventory/refund"))
            .json(Value::Object(payload));
        let refund: EsimGoRefund = decode_payload(PROVIDER_NAME, self.send(call, None).await?)?;
        Ok(Envelope::new(map_refund(refund), self.metadata()))
    }

    async fn revoke_bundle(
        &self,
        iccid: &str,
        bundle: &str,
    ) -> Result<Envelope<BundleRevocation>, GatewayError> {
        validate_identifier("iccid", iccid)?;
        validate_identifier("bundle", bundle)?;
        let subject = Subject::new(ResourceKind::Bundle, bundle);
        let call = ApiCall::delete(
            self.identity
                .endpoint(&format!("/esims/{iccid}/bundles/{bundle}")),
        );
        let body: EsimGoRevocation =
            decode_payload(PROVIDER_NAME, self.send(call, Some(&subject)).await?)?;
        Ok(Envelope::new(
            map_revocation(iccid, bundle, body),
            self.metadata(),
        ))
    }

    async fn get_esim_history(
        &self,
        iccid: &str,
    ) -> Result<Listing<EsimHistoryEvent>, GatewayError> {
        validate_identifier("iccid", iccid)?;
        let subject = Subject::new(ResourceKind::ESim, iccid);
        let body = self
            .get(&format!("/esims/{iccid}/history"), Some(&subject))
            .await?;
        let history: EsimGoHistory = decode_payload(PROVIDER_NAME, body)?;
        let events = history.history.into_iter().map(map_history).collect();
        Ok(Listing::complete(events, self.metadata()))
    }
}
