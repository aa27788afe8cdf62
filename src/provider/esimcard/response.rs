use serde_json::Value;

use crate::error::GatewayError;
use crate::normalize::{StatusTable, normalize_status, parse_datetime, price_value, to_megabytes};
use crate::provider::{decode_payload, lpa_activation_code};
use crate::types::{
    AssignedBundle, Balance, BundleStatus, Country, ESim, EsimStatus, Order, OrderEsim, OrderItem,
    OrderStatus, Package, Region, Usage,
};

use super::PROVIDER_NAME;
use super::types::{
    EsimCardBalance, EsimCardBundle, EsimCardContinent, EsimCardCountry, EsimCardEsim,
    EsimCardOrder, EsimCardPackage, EsimCardPurchase, EsimCardUsage,
};

const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_DATA_UNIT: &str = "GB";

pub(crate) static ESIM_STATUSES: StatusTable<EsimStatus> = StatusTable::new(
    "esimcard_esim",
    &[
        ("released", EsimStatus::Unused),
        ("initiated", EsimStatus::Unused),
        ("installed", EsimStatus::Installed),
        ("active", EsimStatus::Active),
        ("enabled", EsimStatus::Active),
        ("disabled", EsimStatus::Disabled),
        ("revoked", EsimStatus::Deleted),
        ("failed", EsimStatus::Deleted),
    ],
    EsimStatus::Unused,
);

pub(crate) static BUNDLE_STATUSES: StatusTable<BundleStatus> = StatusTable::new(
    "esimcard_bundle",
    &[
        ("released", BundleStatus::Active),
        ("installed", BundleStatus::Active),
        ("active", BundleStatus::Active),
        ("completed", BundleStatus::Depleted),
        ("expired", BundleStatus::Expired),
        ("revoked", BundleStatus::Inactive),
        ("failed", BundleStatus::Inactive),
        ("initiated", BundleStatus::Inactive),
        ("processing", BundleStatus::Inactive),
    ],
    BundleStatus::Inactive,
);

pub(crate) static ORDER_STATUSES: StatusTable<OrderStatus> = StatusTable::new(
    "esimcard_order",
    &[
        ("completed", OrderStatus::Completed),
        ("success", OrderStatus::Completed),
        ("released", OrderStatus::Completed),
        ("processing", OrderStatus::Processing),
        ("initiated", OrderStatus::Pending),
        ("pending", OrderStatus::Pending),
        ("failed", OrderStatus::Failed),
        ("cancelled", OrderStatus::Cancelled),
        ("refunded", OrderStatus::Cancelled),
    ],
    OrderStatus::Pending,
);

/// Renders string or numeric identifiers as text.
pub(crate) fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Reads a quantity sent either as a number or as a numeric string.
pub(crate) fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn count(value: Option<&Value>) -> Option<u32> {
    number(value)
        .filter(|amount| *amount > 0.0)
        .map(|amount| amount.round() as u32)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

fn missing(field: &str) -> GatewayError {
    GatewayError::provider(PROVIDER_NAME, format!("response is missing {field}"))
}

/// Decodes a list payload. A malformed entry fails the whole list.
pub(crate) fn decode_list<T>(data: Value) -> Result<Vec<T>, GatewayError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match data {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| decode_payload(PROVIDER_NAME, item))
            .collect(),
        other => Err(GatewayError::provider(
            PROVIDER_NAME,
            format!("expected a list, got {}", kind_of(&other)),
        )),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn country_iso(country: &EsimCardCountry) -> Option<String> {
    non_empty(country.code.clone().or_else(|| country.iso2.clone()))
        .map(|iso| iso.to_ascii_uppercase())
}

pub(crate) fn map_country(country: EsimCardCountry) -> Option<Country> {
    let iso2 = country_iso(&country)?;
    Some(Country {
        name: non_empty(country.name.or(country.country_name)).unwrap_or_else(|| iso2.clone()),
        iso2,
        region: None,
    })
}

pub(crate) fn map_region(continent: EsimCardContinent) -> Option<Region> {
    let id = text(continent.id.as_ref())?;
    Some(Region {
        name: non_empty(continent.name.or(continent.continent_name)).unwrap_or_else(|| id.clone()),
        id,
        countries: Vec::new(),
    })
}

pub(crate) fn map_package(package: EsimCardPackage) -> Result<Package, GatewayError> {
    let id = text(package.id.as_ref())
        .or_else(|| text(package.package_type_id.as_ref()))
        .ok_or_else(|| missing("package id"))?;

    let mut countries: Vec<Country> = package
        .countries
        .into_iter()
        .filter_map(|country| {
            let iso2 = non_empty(country.iso2.or(country.country_iso2))?.to_ascii_uppercase();
            Some(Country {
                name: non_empty(country.name.or(country.country_name))
                    .unwrap_or_else(|| iso2.clone()),
                iso2,
                region: None,
            })
        })
        .collect();
    if countries.is_empty() {
        if let Some(iso2) = non_empty(package.country_iso2) {
            let iso2 = iso2.to_ascii_uppercase();
            countries.push(Country {
                name: package.country_name.unwrap_or_else(|| iso2.clone()),
                iso2,
                region: None,
            });
        }
    }

    let amount = number(package.data.as_ref());
    let unit = package.data_unit.as_deref().unwrap_or(DEFAULT_DATA_UNIT);
    let unlimited = package.unlimited_data.unwrap_or(false) || amount == Some(0.0);
    let data_mb = if unlimited {
        None
    } else {
        amount.and_then(|amount| to_megabytes(amount, unit))
    };

    let price = price_value(package.price.as_ref())
        .or_else(|| price_value(package.selling_price.as_ref()))
        .unwrap_or(0.0);

    Ok(Package {
        name: non_empty(package.name.or(package.package_name)).unwrap_or_else(|| id.clone()),
        id,
        description: package.description,
        countries,
        data_mb,
        unlimited,
        voice_minutes: count(package.voice_minutes.as_ref())
            .or_else(|| count(package.call_minutes.as_ref())),
        sms: count(package.sms.as_ref()).or_else(|| count(package.sms_count.as_ref())),
        validity_days: count(package.validity.as_ref())
            .or_else(|| count(package.duration_days.as_ref())),
        price,
        currency: package
            .currency
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        speeds: package.speeds,
        autostart: None,
        networks: Vec::new(),
    })
}

pub(crate) fn purchase_order_id(purchase: &EsimCardPurchase) -> Option<String> {
    text(purchase.order_id.as_ref()).or_else(|| text(purchase.id.as_ref()))
}

pub(crate) fn map_purchase_esim(purchase: &EsimCardPurchase) -> Option<OrderEsim> {
    let iccid = non_empty(purchase.iccid.clone())?;
    let activation_code = purchase.lpa_string.clone().or_else(|| {
        lpa_activation_code(
            purchase.smdp_address.as_deref(),
            purchase.matching_id.as_deref(),
        )
    });
    Some(OrderEsim {
        iccid,
        matching_id: purchase.matching_id.clone(),
        smdp_address: purchase.smdp_address.clone(),
        activation_code,
    })
}

pub(crate) fn map_order(order: EsimCardOrder) -> Result<Order, GatewayError> {
    let id = text(order.order_id.as_ref())
        .or_else(|| text(order.id.as_ref()))
        .ok_or_else(|| missing("order id"))?;
    let esims: Vec<OrderEsim> = non_empty(order.iccid)
        .map(|iccid| {
            let activation_code = order.lpa_string.clone().or_else(|| {
                lpa_activation_code(order.smdp_address.as_deref(), order.matching_id.as_deref())
            });
            OrderEsim {
                iccid,
                matching_id: order.matching_id.clone(),
                smdp_address: order.smdp_address.clone(),
                activation_code,
            }
        })
        .into_iter()
        .collect();

    let unit_price = price_value(order.price.as_ref());
    let items = match (text(order.package_type_id.as_ref()), &order.package_name) {
        (None, None) => Vec::new(),
        (None, Some(_)) => return Err(missing("order package id")),
        (Some(package_id), _) => vec![OrderItem {
            package_id,
            quantity: 1,
            unit_price,
            subtotal: unit_price,
            esims,
        }],
    };

    Ok(Order {
        vendor_order_ids: vec![id.clone()],
        id: Some(id),
        status: normalize_status(order.status.as_deref(), &ORDER_STATUSES),
        status_message: None,
        items,
        total: price_value(order.total.as_ref()).or(unit_price),
        currency: order.currency.or_else(|| Some(DEFAULT_CURRENCY.to_string())),
        created_at: order.created_at.as_deref().and_then(parse_datetime),
        assigned: true,
        reference: None,
    })
}

/// Currency of a purchase; the reseller API quotes in US dollars unless it says
/// otherwise.
pub(crate) fn purchase_currency(purchase: &EsimCardPurchase) -> String {
    non_empty(purchase.currency.clone()).unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
}

fn megabytes(amount: Option<&Value>, unit: &str) -> Option<u64> {
    number(amount).and_then(|amount| to_megabytes(amount, unit))
}

pub(crate) fn map_bundle(bundle: EsimCardBundle) -> Result<AssignedBundle, GatewayError> {
    let package_id = text(bundle.package_type_id.as_ref()).or_else(|| text(bundle.id.as_ref()));
    let name = non_empty(bundle.package_name.or(bundle.name))
        .or_else(|| package_id.clone())
        .ok_or_else(|| missing("bundle name"))?;

    let initial_unit = bundle
        .initial_data_unit
        .or(bundle.data_unit)
        .unwrap_or_else(|| DEFAULT_DATA_UNIT.to_string());
    let remaining_unit = bundle.rem_data_unit.unwrap_or_else(|| initial_unit.clone());
    let unlimited = bundle.unlimited_data.unwrap_or(false);

    Ok(AssignedBundle {
        name,
        package_id,
        status: normalize_status(bundle.status.as_deref(), &BUNDLE_STATUSES),
        data_total_mb: megabytes(
            bundle.initial_data_quantity.as_ref().or(bundle.data.as_ref()),
            &initial_unit,
        ),
        data_remaining_mb: megabytes(
            bundle
                .rem_data_quantity
                .as_ref()
                .or(bundle.remaining_data.as_ref()),
            &remaining_unit,
        ),
        unlimited,
        started_at: bundle
            .start_date
            .or(bundle.activated_at)
            .as_deref()
            .and_then(parse_datetime),
        expires_at: bundle
            .expiry_date
            .or(bundle.expires_at)
            .as_deref()
            .and_then(parse_datetime),
    })
}

/// Bundles attached to an eSIM record: a `packages`/`bundles` list, or the record
/// itself when it describes a single package inline.
pub(crate) fn esim_bundles(data: &Value, esim: &EsimCardEsim) -> Result<Vec<AssignedBundle>, GatewayError> {
    if let Some(list) = esim.packages.as_ref().or(esim.bundles.as_ref()) {
        return list.iter().cloned().map(map_bundle).collect();
    }
    if esim.package_name.is_some() {
        let inline: EsimCardBundle = decode_payload(PROVIDER_NAME, data.clone())?;
        return Ok(vec![map_bundle(inline)?]);
    }
    Ok(Vec::new())
}

pub(crate) fn map_esim(data: Value) -> Result<ESim, GatewayError> {
    let esim: EsimCardEsim = decode_payload(PROVIDER_NAME, data.clone())?;
    let bundles = esim_bundles(&data, &esim)?;
    let iccid = non_empty(esim.iccid).ok_or_else(|| missing("esim iccid"))?;
    let activation_code = esim.lpa_string.or_else(|| {
        lpa_activation_code(esim.smdp_address.as_deref(), esim.matching_id.as_deref())
    });
    Ok(ESim {
        iccid,
        eid: non_empty(esim.eid),
        status: normalize_status(esim.status.as_deref(), &ESIM_STATUSES),
        activation_code,
        smdp_address: esim.smdp_address,
        matching_id: esim.matching_id,
        created_at: esim.created_at.as_deref().and_then(parse_datetime),
        bundles,
    })
}

pub(crate) fn map_usage(iccid: &str, usage: EsimCardUsage) -> Usage {
    let initial_unit = usage
        .initial_data_unit
        .unwrap_or_else(|| DEFAULT_DATA_UNIT.to_string());
    let remaining_unit = usage.rem_data_unit.unwrap_or_else(|| initial_unit.clone());
    let unlimited = usage.unlimited_data.unwrap_or(false);
    let total = megabytes(usage.initial_data_quantity.as_ref(), &initial_unit);
    let remaining = megabytes(usage.rem_data_quantity.as_ref(), &remaining_unit);
    let used = match (total, remaining) {
        (Some(total), Some(remaining)) => Some(total.saturating_sub(remaining)),
        _ => None,
    };
    let active = normalize_status(usage.status.as_deref(), &BUNDLE_STATUSES) == BundleStatus::Active;

    Usage {
        iccid: iccid.to_string(),
        bundle: usage.package_name,
        data_used_mb: used,
        data_remaining_mb: if unlimited { None } else { remaining },
        data_total_mb: if unlimited { None } else { total },
        unlimited,
        active,
    }
}

pub(crate) fn map_balance(balance: EsimCardBalance) -> Result<Balance, GatewayError> {
    let amount = price_value(balance.balance.as_ref())
        .or_else(|| price_value(balance.amount.as_ref()))
        .ok_or_else(|| missing("balance"))?;
    Ok(Balance {
        amount,
        currency: balance
            .currency
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
    })
}
