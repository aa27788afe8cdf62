use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::GatewayError;
use crate::normalize::{StatusTable, normalize_status, parse_datetime, price_value};
use crate::provider::lpa_activation_code;
use crate::types::{
    AssignedBundle, Balance, BundleRevocation, BundleStatus, Country, ESim, EsimHistoryEvent,
    EsimStatus, Network, Order, OrderEsim, OrderItem, OrderStatus, Package, Refund, Region,
};

use super::PROVIDER_NAME;
use super::types::{
    EsimGoAssignedBundle, EsimGoBundle, EsimGoEsim, EsimGoHistoryEntry, EsimGoOrder,
    EsimGoOrderEsim, EsimGoOrganisation, EsimGoRefund, EsimGoRevocation,
};

const DEFAULT_CURRENCY: &str = "USD";

pub(crate) static ESIM_STATUSES: StatusTable<EsimStatus> = StatusTable::new(
    "esimgo_esim",
    &[
        ("NEW", EsimStatus::Unused),
        ("RELEASED", EsimStatus::Unused),
        ("BPP_INSTALLATION", EsimStatus::Installed),
        ("ENABLE", EsimStatus::Active),
        ("DISABLE", EsimStatus::Disabled),
        ("DELETED", EsimStatus::Deleted),
    ],
    EsimStatus::Unused,
);

pub(crate) static BUNDLE_STATUSES: StatusTable<BundleStatus> = StatusTable::new(
    "esimgo_bundle",
    &[
        ("ACTIVE", BundleStatus::Active),
        ("INACTIVE", BundleStatus::Inactive),
        ("EXPIRED", BundleStatus::Expired),
        ("DEPLETED", BundleStatus::Depleted),
    ],
    BundleStatus::Inactive,
);

pub(crate) static ORDER_STATUSES: StatusTable<OrderStatus> = StatusTable::new(
    "esimgo_order",
    &[
        ("COMPLETED", OrderStatus::Completed),
        ("PROCESSING", OrderStatus::Processing),
        ("PENDING", OrderStatus::Pending),
        ("VALIDATED", OrderStatus::Pending),
        ("FAILED", OrderStatus::Failed),
        ("CANCELLED", OrderStatus::Cancelled),
        ("CANCELED", OrderStatus::Cancelled),
    ],
    OrderStatus::Pending,
);

/// Returns `value[key]` when the payload wraps the record, otherwise the payload.
pub(crate) fn unwrap_record(value: Value, key: &str) -> Value {
    match value {
        Value::Object(mut map) if map.get(key).is_some_and(Value::is_object) => {
            map.remove(key).unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn missing(field: &str) -> GatewayError {
    GatewayError::provider(PROVIDER_NAME, format!("response is missing {field}"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

pub(crate) fn map_package(bundle: EsimGoBundle) -> Result<Package, GatewayError> {
    let id = non_empty(bundle.name).ok_or_else(|| missing("bundle name"))?;

    let mut countries = Vec::new();
    let mut networks = Vec::new();
    for entry in bundle.countries {
        let (iso, name, region) = match entry.country {
            Some(nested) => (nested.iso, nested.name, nested.region),
            None => (entry.iso, entry.name, entry.region),
        };
        let Some(iso) = non_empty(iso) else {
            continue;
        };
        networks.extend(entry.networks.into_iter().filter_map(|network| {
            Some(Network {
                country_iso2: iso.clone(),
                name: non_empty(network.name)?,
                brand_name: network.brand_name,
                speeds: network.speeds,
            })
        }));
        countries.push(Country {
            name: name.unwrap_or_else(|| iso.clone()),
            iso2: iso,
            region,
        });
    }

    let unlimited = bundle.unlimited.unwrap_or(false)
        || bundle.data_amount.is_some_and(|amount| amount < 0.0);
    let data_mb = match bundle.data_amount {
        Some(amount) if !unlimited => Some(amount.round() as u64),
        _ => None,
    };

    let mut voice_minutes = None;
    let mut sms = None;
    for allowance in &bundle.allowances {
        let amount = allowance.amount.map(|value| value.max(0.0).round() as u32);
        match allowance.kind.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("VOICE") => voice_minutes = amount,
            Some("SMS") => sms = amount,
            _ => {}
        }
    }

    Ok(Package {
        name: bundle.description.clone().unwrap_or_else(|| id.clone()),
        id,
        description: bundle.description,
        countries,
        data_mb,
        unlimited,
        voice_minutes,
        sms,
        validity_days: bundle.duration,
        price: price_value(bundle.price.as_ref()).unwrap_or(0.0),
        currency: DEFAULT_CURRENCY.to_string(),
        speeds: parse_speeds(bundle.speed.as_ref()),
        autostart: bundle.autostart,
        networks,
    })
}

/// Speeds arrive as a list, a single string, or an object with a `speeds` list.
fn parse_speeds(speed: Option<&Value>) -> Vec<String> {
    let strings = |items: &Vec<Value>| {
        items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect()
    };
    match speed {
        Some(Value::Array(items)) => strings(items),
        Some(Value::String(text)) if !text.is_empty() => vec![text.clone()],
        Some(Value::Object(map)) => match map.get("speeds") {
            Some(Value::Array(items)) => strings(items),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Distinct countries across the catalogue, sorted by name.
pub(crate) fn collect_countries(packages: &[Package]) -> Vec<Country> {
    let mut by_iso: BTreeMap<&str, &Country> = BTreeMap::new();
    for country in packages.iter().flat_map(|package| &package.countries) {
        by_iso.entry(country.iso2.as_str()).or_insert(country);
    }
    let mut countries: Vec<Country> = by_iso.into_values().cloned().collect();
    countries.sort_by(|a, b| a.name.cmp(&b.name));
    countries
}

/// Regions named by the catalogue countries, each with its sorted ISO codes.
pub(crate) fn collect_regions(packages: &[Package]) -> Vec<Region> {
    let mut regions: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for country in packages.iter().flat_map(|package| &package.countries) {
        if let Some(region) = country.region.as_deref().filter(|name| !name.is_empty()) {
            regions.entry(region).or_default().insert(country.iso2.as_str());
        }
    }
    regions
        .into_iter()
        .map(|(name, countries)| Region {
            id: name.to_lowercase().replace(' ', "_"),
            name: name.to_string(),
            countries: countries.into_iter().map(str::to_string).collect(),
        })
        .collect()
}

pub(crate) fn map_order_esim(esim: EsimGoOrderEsim) -> Option<OrderEsim> {
    let iccid = non_empty(esim.iccid)?;
    let activation_code = esim.lpa_string.or_else(|| {
        lpa_activation_code(esim.smdp_address.as_deref(), esim.matching_id.as_deref())
    });
    Some(OrderEsim {
        iccid,
        matching_id: esim.matching_id,
        smdp_address: esim.smdp_address,
        activation_code,
    })
}

/// Maps a stored order; the vendor reference is required.
pub(crate) fn map_order(order: EsimGoOrder) -> Result<Order, GatewayError> {
    let order = build_order(order)?;
    if order.id.is_none() {
        return Err(missing("order reference"));
    }
    Ok(order)
}

/// Maps the answer to a `validate` order, which creates nothing and carries no reference.
pub(crate) fn map_validated_order(order: EsimGoOrder) -> Result<Order, GatewayError> {
    build_order(order)
}

fn build_order(order: EsimGoOrder) -> Result<Order, GatewayError> {
    let items = order
        .order
        .into_iter()
        .map(|line| {
            Ok(OrderItem {
                package_id: non_empty(line.item).ok_or_else(|| missing("order item"))?,
                quantity: line.quantity.unwrap_or(1),
                unit_price: price_value(line.price_per_unit.as_ref()),
                subtotal: price_value(line.sub_total.as_ref()),
                esims: line.esims.into_iter().filter_map(map_order_esim).collect(),
            })
        })
        .collect::<Result<Vec<_>, GatewayError>>()?;

    let id = non_empty(order.order_reference);
    Ok(Order {
        vendor_order_ids: id.iter().cloned().collect(),
        id,
        status: normalize_status(order.status.as_deref(), &ORDER_STATUSES),
        status_message: order.status_message,
        items,
        total: price_value(order.total.as_ref()),
        currency: order.currency.or_else(|| Some(DEFAULT_CURRENCY.to_string())),
        created_at: order.created_date.as_deref().and_then(parse_datetime),
        assigned: order.assigned.unwrap_or(false),
        reference: None,
    })
}

pub(crate) fn map_esim(esim: EsimGoEsim) -> Result<ESim, GatewayError> {
    let iccid = non_empty(esim.iccid).ok_or_else(|| missing("esim iccid"))?;
    let bundles = esim
        .bundles
        .into_iter()
        .map(map_bundle)
        .collect::<Result<Vec<_>, _>>()?;
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
        created_at: esim.created_date.as_deref().and_then(parse_datetime),
        bundles,
    })
}

pub(crate) fn map_bundle(bundle: EsimGoAssignedBundle) -> Result<AssignedBundle, GatewayError> {
    let name = non_empty(bundle.name).ok_or_else(|| missing("bundle name"))?;
    let megabytes = |amount: Option<f64>| amount.map(|value| value.max(0.0).round() as u64);
    Ok(AssignedBundle {
        package_id: Some(name.clone()),
        name,
        status: normalize_status(bundle.status.as_deref(), &BUNDLE_STATUSES),
        data_total_mb: megabytes(bundle.initial_amount),
        data_remaining_mb: megabytes(bundle.remaining_amount),
        unlimited: bundle.unlimited.unwrap_or(false),
        started_at: bundle.start_time.as_deref().and_then(parse_datetime),
        expires_at: bundle.expiry_time.as_deref().and_then(parse_datetime),
    })
}

pub(crate) fn map_history(entry: EsimGoHistoryEntry) -> EsimHistoryEvent {
    EsimHistoryEvent {
        occurred_at: entry.date.as_deref().and_then(parse_datetime),
        kind: non_empty(entry.kind).unwrap_or_else(|| "UNKNOWN".to_string()),
        description: entry.description,
        bundle: entry.bundle_name,
        metadata: entry.metadata,
    }
}

pub(crate) fn map_balance(organisation: EsimGoOrganisation) -> Result<Balance, GatewayError> {
    let amount =
        price_value(organisation.balance.as_ref()).ok_or_else(|| missing("organisation balance"))?;
    Ok(Balance {
        amount,
        currency: organisation
            .currency
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
    })
}

pub(crate) fn map_refund(refund: EsimGoRefund) -> Refund {
    let refund_id = match refund.refund_id {
        Some(Value::String(id)) => Some(id),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    };
    Refund {
        accepted: refund.success.unwrap_or(true),
        refund_id,
        amount: price_value(refund.amount.as_ref()),
        currency: refund.currency.or_else(|| Some(DEFAULT_CURRENCY.to_string())),
        message: refund.message,
    }
}

pub(crate) fn map_revocation(iccid: &str, bundle: &str, body: EsimGoRevocation) -> BundleRevocation {
    BundleRevocation {
        iccid: iccid.to_string(),
        bundle: bundle.to_string(),
        refunded_amount: price_value(body.refund_amount.as_ref()),
        currency: body.currency,
        message: body.message,
    }
}
