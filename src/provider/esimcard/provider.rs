use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, ResourceKind};
use crate::normalize::{Subject, price_value};
use crate::provider::{
    AuthConfig, EsimProvider, ProviderIdentity, aggregate_usage, decode_payload,
    validate_identifier, validate_order,
};
use crate::resilience::{ApiCall, CallError, ResilientClient};
use crate::types::{
    ApplyBundleRequest, ApplyBundleResult, AssignedBundle, Balance, CapabilityDescriptor, Country,
    CreateOrderRequest, ESim, Envelope, EsimQuery, Listing, Order, OrderItem, OrderQuery,
    OrderStatus, Package, PackageQuery, ProviderMetadata, Region, Usage,
};

use super::error::{map_call_error, parse_esimcard_error, rejected_envelope};
use super::response::{
    country_iso, decode_list, esim_bundles, map_balance, map_country, map_esim, map_order,
    map_package, map_purchase_esim, map_region, map_usage, purchase_currency, purchase_order_id,
    text,
};
use super::types::{
    EsimCardBalance, EsimCardContinent, EsimCardCountry, EsimCardEnvelope, EsimCardEsim,
    EsimCardLogin, EsimCardOrder, EsimCardPackage, EsimCardPurchase, EsimCardUsage,
};
use super::{DEFAULT_BASE_URL, PROVIDER_NAME, TOKEN_TTL};

const RESELLER_PREFIX: &str = "/developer/reseller";
const PACKAGE_TYPES: [&str; 2] = ["DATA-ONLY", "DATA-VOICE-SMS"];

#[derive(Clone)]
struct AccessToken {
    value: String,
    obtained_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        self.obtained_at.elapsed() < TOKEN_TTL
    }
}

/// esimCard reseller provider.
pub struct EsimCardProvider {
    identity: ProviderIdentity,
    client: ResilientClient,
    token: Mutex<Option<AccessToken>>,
    login_lock: tokio::sync::Mutex<()>,
}

impl EsimCardProvider {
    /// Creates a live provider that logs in with the reseller credentials.
    pub fn new(
        client: ResilientClient,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            identity: ProviderIdentity {
                name: PROVIDER_NAME,
                live_base_url: DEFAULT_BASE_URL.to_string(),
                sandbox_base_url: DEFAULT_BASE_URL.to_string(),
                sandbox: false,
                auth: AuthConfig::Login {
                    email: email.into(),
                    password: password.into(),
                },
            },
            client,
            token: Mutex::new(None),
            login_lock: tokio::sync::Mutex::new(()),
        }
    }

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

    fn endpoint(&self, path: &str) -> String {
        self.identity.endpoint(&format!("{RESELLER_PREFIX}{path}"))
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard
            .as_ref()
            .filter(|token| token.is_fresh())
            .map(|token| token.value.clone())
    }

    /// Drops the cached token if it is still the one that was rejected.
    fn invalidate_token(&self, rejected: &str) {
        let mut guard = self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.as_ref().is_some_and(|token| token.value == rejected) {
            *guard = None;
        }
    }

    /// Returns a valid bearer token, logging in at most once across concurrent callers.
    async fn access_token(&self) -> Result<String, GatewayError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }
        let _login = self.login_lock.lock().await;
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let value = self.login().await?;
        let mut guard = self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(AccessToken {
            value: value.clone(),
            obtained_at: Instant::now(),
        });
        Ok(value)
    }

    async fn login(&self) -> Result<String, GatewayError> {
        let AuthConfig::Login { email, password } = &self.identity.auth else {
            return Err(GatewayError::InvalidConfig {
                field: "esimcard.credential".to_string(),
                reason: "login credentials are required".to_string(),
            });
        };
        debug!(provider = PROVIDER_NAME, "logging in to reseller api");

        let call = ApiCall::post(self.endpoint("/login"))
            .json(json!({"email": email, "password": password}))
            .idempotent(true);
        let body = self.client.execute(call).await.map_err(|err| match err {
            CallError::Status {
                status: 401 | 403 | 422,
                body,
                ..
            } => GatewayError::Unauthorized {
                provider: PROVIDER_NAME,
                message: parse_esimcard_error(&body)
                    .1
                    .unwrap_or_else(|| "login rejected".to_string()),
            },
            other => map_call_error(other, None),
        })?;

        let login: EsimCardLogin = decode_payload(PROVIDER_NAME, body)?;
        match (login.status, login.access_token) {
            (Some(true), Some(token)) if !token.is_empty() => {
                info!(provider = PROVIDER_NAME, "reseller login succeeded");
                Ok(token)
            }
            _ => Err(GatewayError::Unauthorized {
                provider: PROVIDER_NAME,
                message: login
                    .message
                    .unwrap_or_else(|| "login did not return an access token".to_string()),
            }),
        }
    }

    /// Sends an authenticated call. A 401 refreshes the token and repeats the call
    /// once.
    async fn send(&self, call: ApiCall, subject: Option<&Subject>) -> Result<Value, GatewayError> {
        let token = self.access_token().await?;
        let first = self
            .client
            .execute(call.clone().header("Authorization", format!("Bearer {token}")))
            .await;
        let result = match first {
            Err(CallError::Status { status: 401, .. }) => {
                warn!(provider = PROVIDER_NAME, "access token rejected, logging in again");
                self.invalidate_token(&token);
                let token = self.access_token().await?;
                self.client
                    .execute(call.header("Authorization", format!("Bearer {token}")))
                    .await
            }
            other => other,
        };
        result.map_err(|err| map_call_error(err, subject))
    }

    /// Sends a call and opens the `{status, data}` envelope.
    async fn envelope(
        &self,
        call: ApiCall,
        subject: Option<&Subject>,
    ) -> Result<EsimCardEnvelope, GatewayError> {
        let body = self.send(call, subject).await?;
        let envelope: EsimCardEnvelope = decode_payload(PROVIDER_NAME, body)?;
        if envelope.status == Some(false) {
            return Err(rejected_envelope(envelope.message, subject));
        }
        Ok(envelope)
    }

    async fn get(&self, path: &str, subject: Option<&Subject>) -> Result<EsimCardEnvelope, GatewayError> {
        self.envelope(ApiCall::get(self.endpoint(path)), subject)
            .await
    }

    async fn countries_raw(&self) -> Result<Vec<EsimCardCountry>, GatewayError> {
        decode_list(self.get("/packages/country", None).await?.data)
    }

    async fn continents_raw(&self) -> Result<Vec<EsimCardContinent>, GatewayError> {
        decode_list(self.get("/packages/continent", None).await?.data)
    }

    /// Every package of every type, deduplicated by id in first-seen order.
    async fn all_packages(&self) -> Result<Vec<EsimCardPackage>, GatewayError> {
        let mut seen = BTreeSet::new();
        let mut packages = Vec::new();
        for package_type in PACKAGE_TYPES {
            let call = ApiCall::get(self.endpoint("/packages")).query("package_type", package_type);
            let batch: Vec<EsimCardPackage> = decode_list(self.envelope(call, None).await?.data)?;
            for package in batch {
                let Some(id) = text(package.id.as_ref()) else {
                    continue;
                };
                if seen.insert(id) {
                    packages.push(package);
                }
            }
        }
        Ok(packages)
    }

    async fn packages_for_country(&self, iso2: &str) -> Result<Vec<EsimCardPackage>, GatewayError> {
        let countries = self.countries_raw().await?;
        let id = countries
            .iter()
            .find(|country| {
                country_iso(country).is_some_and(|iso| iso.eq_ignore_ascii_case(iso2.trim()))
            })
            .and_then(|country| text(country.id.as_ref()));
        match id {
            Some(id) => {
                let path = format!("/packages/country/{id}/{}", PACKAGE_TYPES[0]);
                decode_list(self.get(&path, None).await?.data)
            }
            None => {
                debug!(provider = PROVIDER_NAME, country = iso2, "country not in catalogue");
                Ok(Vec::new())
            }
        }
    }

    async fn packages_for_region(&self, region: &str) -> Result<Vec<EsimCardPackage>, GatewayError> {
        let continents = self.continents_raw().await?;
        let region = region.trim();
        let id = continents
            .iter()
            .find(|continent| {
                let name_matches = continent
                    .name
                    .as_deref()
                    .or(continent.continent_name.as_deref())
                    .is_some_and(|name| name.eq_ignore_ascii_case(region));
                name_matches || text(continent.id.as_ref()).as_deref() == Some(region)
            })
            .and_then(|continent| text(continent.id.as_ref()));
        match id {
            Some(id) => {
                let path = format!("/packages/continent/{id}/{}", PACKAGE_TYPES[0]);
                decode_list(self.get(&path, None).await?.data)
            }
            None => {
                debug!(provider = PROVIDER_NAME, region, "region not in catalogue");
                Ok(Vec::new())
            }
        }
    }

    /// Buys one unit of a package, optionally topping up an existing eSIM.
    async fn purchase(
        &self,
        package_id: &str,
        iccid: Option<&str>,
    ) -> Result<EsimCardPurchase, GatewayError> {
        let mut payload = json!({ "package_type_id": package_id });
        if let Some(iccid) = iccid {
            payload["iccid"] = json!(iccid);
        }
        let call = ApiCall::post(self.endpoint("/package/purchase")).json(payload);
        let envelope = self.envelope(call, None).await?;
        decode_payload(PROVIDER_NAME, envelope.data)
    }

    async fn esim_record(&self, iccid: &str) -> Result<Value, GatewayError> {
        validate_identifier("iccid", iccid)?;
        let subject = Subject::new(ResourceKind::ESim, iccid);
        Ok(self
            .get(&format!("/my-esims/{iccid}"), Some(&subject))
            .await?
            .data)
    }

    async fn assigned_bundles(&self, iccid: &str) -> Result<Vec<AssignedBundle>, GatewayError> {
        let data = self.esim_record(iccid).await?;
        let esim: EsimCardEsim = decode_payload(PROVIDER_NAME, data.clone())?;
        esim_bundles(&data, &esim)
    }
}

#[async_trait]
impl EsimProvider for EsimCardProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn identity(&self) -> &ProviderIdentity {
        &self.identity
    }

    fn capabilities(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::default()
    }

    async fn list_countries(&self) -> Result<Listing<Country>, GatewayError> {
        let mut countries: Vec<Country> = self
            .countries_raw()
            .await?
            .into_iter()
            .filter_map(map_country)
            .collect();
        countries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Listing::complete(countries, self.metadata()))
    }

    async fn list_regions(&self) -> Result<Listing<Region>, GatewayError> {
        let regions = self
            .continents_raw()
            .await?
            .into_iter()
            .filter_map(map_region)
            .collect();
        Ok(Listing::complete(regions, self.metadata()))
    }

    async fn list_packages(&self, query: PackageQuery) -> Result<Listing<Package>, GatewayError> {
        let page = query.page.normalized();
        let raw = match (&query.country, &query.region) {
            (Some(country), _) => self.packages_for_country(country).await?,
            (None, Some(region)) => self.packages_for_region(region).await?,
            (None, None) => self.all_packages().await?,
        };
        let total = raw.len() as u64;
        let packages = raw
            .into_iter()
            .skip(page.offset())
            .take(page.limit as usize)
            .map(map_package)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Listing::page(packages, page, Some(total), self.metadata()))
    }

    async fn get_package(&self, package_id: &str) -> Result<Envelope<Package>, GatewayError> {
        validate_identifier("package_id", package_id)?;
        let subject = Subject::new(ResourceKind::Package, package_id);
        let envelope = self
            .get(&format!("/package/detail/{package_id}"), Some(&subject))
            .await?;
        let package: EsimCardPackage = decode_payload(PROVIDER_NAME, envelope.data)?;
        Ok(Envelope::new(map_package(package)?, self.metadata()))
    }

    /// esimCard sells one unit per purchase call, so an order of `n` units issues
    /// `n` sequential purchases. A failure after at least one purchase is reported as
    /// [`GatewayError::PartialOrder`] with the orders already booked.
    async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<Envelope<Order>, GatewayError> {
        validate_order(&request)?;
        let iccid = request.iccids.first().map(String::as_str);

        let mut order_ids: Vec<String> = Vec::new();
        let mut total: Option<f64> = None;
        let mut currency = None;
        let mut purchased = 0u32;
        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let mut item = OrderItem {
                package_id: line.package_id.clone(),
                quantity: line.quantity,
                unit_price: None,
                subtotal: None,
                esims: Vec::new(),
            };
            for _ in 0..line.quantity {
                let purchase = match self.purchase(&line.package_id, iccid).await {
                    Ok(purchase) => purchase,
                    Err(err) if purchased == 0 => return Err(err),
                    Err(err) => {
                        warn!(
                            provider = PROVIDER_NAME,
                            purchased,
                            order_ids = ?order_ids,
                            package_id = %line.package_id,
                            error = %err,
                            "order interrupted after partial purchase"
                        );
                        return Err(GatewayError::PartialOrder {
                            provider: PROVIDER_NAME,
                            purchased,
                            order_ids,
                            source: Box::new(err),
                        });
                    }
                };
                purchased += 1;
                match purchase_order_id(&purchase) {
                    Some(id) => order_ids.push(id),
                    None => warn!(
                        provider = PROVIDER_NAME,
                        package_id = %line.package_id,
                        "purchase response is missing order_id"
                    ),
                }
                if let Some(price) = price_value(purchase.price.as_ref()) {
                    total = Some(total.unwrap_or(0.0) + price);
                    currency.get_or_insert_with(|| purchase_currency(&purchase));
                    item.unit_price = Some(price);
                    item.subtotal = Some(item.subtotal.unwrap_or(0.0) + price);
                }
                item.esims.extend(map_purchase_esim(&purchase));
            }
            items.push(item);
        }

        if order_ids.len() < purchased as usize {
            return Err(GatewayError::PartialOrder {
                provider: PROVIDER_NAME,
                purchased,
                order_ids,
                source: Box::new(GatewayError::provider(
                    PROVIDER_NAME,
                    "purchase response is missing order_id",
                )),
            });
        }
        let order = Order {
            id: order_ids.first().cloned(),
            vendor_order_ids: order_ids,
            status: OrderStatus::Completed,
            status_message: None,
            items,
            total,
            currency,
            created_at: None,
            assigned: true,
            reference: request.reference,
        };
        Ok(Envelope::new(order, self.metadata()))
    }

    async fn get_order(&self, order_id: &str) -> Result<Envelope<Order>, GatewayError> {
        validate_identifier("order_id", order_id)?;
        let subject = Subject::new(ResourceKind::Order, order_id);
        let envelope = self
            .get(&format!("/order/{order_id}"), Some(&subject))
            .await?;
        let order: EsimCardOrder = decode_payload(PROVIDER_NAME, envelope.data)?;
        Ok(Envelope::new(map_order(order)?, self.metadata()))
    }

    /// The creation window is applied to the vendor page after it arrives.
    async fn list_orders(&self, query: OrderQuery) -> Result<Listing<Order>, GatewayError> {
        let page = query.page.normalized();
        let call = ApiCall::get(self.endpoint("/my-bundles"))
            .query("page", page.page)
            .query("per_page", page.limit);
        let envelope = self.envelope(call, None).await?;
        let total = envelope.meta.and_then(|meta| meta.total);
        let orders: Vec<EsimCardOrder> = decode_list(envelope.data)?;
        let returned = orders.len();
        let orders = orders
            .into_iter()
            .map(map_order)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|order| {
                let after = query
                    .created_after
                    .is_none_or(|after| order.created_at.is_none_or(|at| at >= after));
                let before = query
                    .created_before
                    .is_none_or(|before| order.created_at.is_none_or(|at| at <= before));
                after && before
            })
            .collect();
        Ok(Listing::filtered_page(orders, page, returned, total, self.metadata()))
    }

    /// The ICCID filter is applied to the vendor page after it arrives.
    async fn list_esims(&self, query: EsimQuery) -> Result<Listing<ESim>, GatewayError> {
        let page = query.page.normalized();
        let call = ApiCall::get(self.endpoint("/my-esims"))
            .query("page", page.page)
            .query("per_page", page.limit);
        let envelope = self.envelope(call, None).await?;
        let total = envelope.meta.and_then(|meta| meta.total);
        let records = match envelope.data {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            _ => return Err(GatewayError::provider(PROVIDER_NAME, "expected a list of esims")),
        };
        let returned = records.len();
        let mut esims = records
            .into_iter()
            .map(map_esim)
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(iccid) = query.iccid.as_deref() {
            esims.retain(|esim| esim.iccid.contains(iccid));
        }
        Ok(Listing::filtered_page(esims, page, returned, total, self.metadata()))
    }

    async fn get_esim(&self, iccid: &str) -> Result<Envelope<ESim>, GatewayError> {
        let data = self.esim_record(iccid).await?;
        Ok(Envelope::new(map_esim(data)?, self.metadata()))
    }

    async fn apply_bundle(
        &self,
        request: ApplyBundleRequest,
    ) -> Result<Envelope<ApplyBundleResult>, GatewayError> {
        validate_identifier("package_id", &request.package_id)?;
        if let Some(iccid) = &request.iccid {
            validate_identifier("iccid", iccid)?;
        }
        if request.quantity != 1 {
            return Err(GatewayError::invalid_request(
                "esimcard applies exactly one bundle per request",
            ));
        }
        let purchase = self
            .purchase(&request.package_id, request.iccid.as_deref())
            .await?;
        let result = ApplyBundleResult {
            order_reference: purchase_order_id(&purchase),
            esims: map_purchase_esim(&purchase).into_iter().collect(),
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
        validate_identifier("bundle", bundle)?;
        let found = self
            .assigned_bundles(iccid)
            .await?
            .into_iter()
            .find(|assigned| assigned.name == bundle || assigned.package_id.as_deref() == Some(bundle))
            .ok_or_else(|| GatewayError::not_found(PROVIDER_NAME, ResourceKind::Bundle, bundle))?;
        Ok(Envelope::new(found, self.metadata()))
    }

    async fn get_usage(
        &self,
        iccid: &str,
        bundle: Option<&str>,
    ) -> Result<Envelope<Usage>, GatewayError> {
        validate_identifier("iccid", iccid)?;
        if bundle.is_some() {
            let bundles = self.assigned_bundles(iccid).await?;
            let usage = aggregate_usage(PROVIDER_NAME, iccid, bundle, &bundles)?;
            return Ok(Envelope::new(usage, self.metadata()));
        }
        let subject = Subject::new(ResourceKind::ESim, iccid);
        let envelope = self
            .get(&format!("/my-sim/{iccid}/usage"), Some(&subject))
            .await?;
        let usage: EsimCardUsage = decode_payload(PROVIDER_NAME, envelope.data)?;
        Ok(Envelope::new(map_usage(iccid, usage), self.metadata()))
    }

    async fn get_balance(&self) -> Result<Envelope<Balance>, GatewayError> {
        let envelope = self.get("/balance", None).await?;
        let balance: EsimCardBalance = decode_payload(PROVIDER_NAME, envelope.data)?;
        Ok(Envelope::new(map_balance(balance)?, self.metadata()))
    }
}
