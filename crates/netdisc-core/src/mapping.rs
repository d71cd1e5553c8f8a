//! Mapping of transport payloads into structured cache rows.
//!
//! A payload is a JSON list of row objects as produced by the usual
//! command-output parsers. Field names vary by vendor and parser, so each
//! row shape accepts several aliases. Values may arrive as strings or
//! numbers.
//!
//! Accepted payload shapes:
//! - `[{..}, {..}]`
//! - `{"TABLE_x": [{..}, ..]}` (an object whose only member is the list)
//! - `{..}` (a single row)
//!
//! A row missing a required field, or carrying an unparseable address in
//! one, is dropped and counted; any other payload shape is an error.

use netdisc_types::{
    ArpEntry, BgpRoute, CacheRow, CacheTable, CdpNeighbor, DataType, Interface, IpAddressRow,
    IpPrefix, LinkStatus, MacAddress, MacEntry, OspfRoute, StaticRoute, VlanId,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::net::IpAddr;
use thiserror::Error;

/// A payload that is not a list of row objects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unexpected {data_type} payload: {message}")]
pub struct MappingError {
    pub data_type: DataType,
    pub message: String,
}

/// Rows produced from one payload, grouped by table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedRows {
    /// One entry per table the data-type feeds, in [`DataType::tables`] order.
    pub tables: Vec<(CacheTable, Vec<CacheRow>)>,
    /// Row objects that could not be interpreted.
    pub skipped: usize,
}

impl MappedRows {
    fn empty(data_type: DataType) -> Self {
        Self {
            tables: data_type.tables().iter().map(|t| (*t, Vec::new())).collect(),
            skipped: 0,
        }
    }

    fn push(&mut self, row: CacheRow) {
        let table = row.table();
        if let Some((_, rows)) = self.tables.iter_mut().find(|(t, _)| *t == table) {
            rows.push(row);
        }
    }

    /// Total number of rows across tables.
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|(_, rows)| rows.len()).sum()
    }
}

/// Maps a payload for `data_type` into rows.
pub fn map_payload(data_type: DataType, payload: &Value) -> Result<MappedRows, MappingError> {
    let objects = row_objects(payload).map_err(|message| MappingError { data_type, message })?;

    let mut mapped = MappedRows::empty(data_type);
    for object in objects {
        let value = Value::Object(object.clone());
        let rows = match data_type {
            DataType::Interfaces => decode::<WireInterface>(value).and_then(WireInterface::into_rows),
            DataType::Arp => decode::<WireArp>(value).and_then(WireArp::into_rows),
            DataType::StaticRoutes => decode::<WireRoute>(value).and_then(WireRoute::into_static),
            DataType::OspfRoutes => decode::<WireRoute>(value).and_then(WireRoute::into_ospf),
            DataType::BgpRoutes => decode::<WireRoute>(value).and_then(WireRoute::into_bgp),
            DataType::MacTable => decode::<WireMac>(value).and_then(WireMac::into_rows),
            DataType::CdpNeighbors => decode::<WireCdp>(value).and_then(WireCdp::into_rows),
        };

        match rows {
            Some(decoded) => {
                mapped.skipped += decoded.skipped;
                for row in decoded.rows {
                    mapped.push(row);
                }
            }
            None => mapped.skipped += 1,
        }
    }
    Ok(mapped)
}

fn row_objects(payload: &Value) -> Result<Vec<&Map<String, Value>>, String> {
    let list = match payload {
        Value::Array(items) => items,
        Value::Object(map) => match map.values().next() {
            Some(Value::Array(items)) if map.len() == 1 => items,
            _ => return Ok(vec![map]),
        },
        Value::Null => return Err("empty payload".to_string()),
        other => return Err(format!("expected a list of objects, got {}", kind_of(other))),
    };

    list.iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            other => Err(format!("expected row objects, got {}", kind_of(other))),
        })
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Rows decoded from one object, plus sub-rows that had to be dropped.
struct Decoded {
    rows: Vec<CacheRow>,
    skipped: usize,
}

impl Decoded {
    fn one(row: CacheRow) -> Option<Self> {
        Some(Self {
            rows: vec![row],
            skipped: 0,
        })
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Option<T> {
    serde_json::from_value(value).ok()
}

/// A scalar that may be sent as a string, number or boolean.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn text(&self) -> String {
        match self {
            Scalar::Text(s) => s.trim().to_string(),
            Scalar::Unsigned(n) => n.to_string(),
            Scalar::Signed(n) => n.to_string(),
            Scalar::Float(n) => n.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

fn text(field: &Option<Scalar>) -> Option<String> {
    field
        .as_ref()
        .map(Scalar::text)
        .filter(|s| !s.is_empty())
}

fn number<T: std::str::FromStr>(field: &Option<Scalar>) -> Option<T> {
    text(field).and_then(|s| s.parse().ok())
}

fn ip(field: &Option<Scalar>) -> Option<IpAddr> {
    number(field)
}

fn mac(field: &Option<Scalar>) -> Option<MacAddress> {
    number(field)
}

/// Parses `a.b.c.d/nn`, or an address plus a separate length or netmask.
fn prefix(network: &Option<Scalar>, length: &Option<Scalar>) -> Option<IpPrefix> {
    let network = text(network)?;
    if network.contains('/') {
        return network.parse().ok();
    }
    let length = text(length)?;
    if length.contains('.') {
        format!("{} {}", network, length).parse().ok()
    } else {
        format!("{}/{}", network, length).parse().ok()
    }
}

#[derive(Debug, Deserialize)]
struct WireInterface {
    #[serde(alias = "interface", alias = "port", alias = "ifname")]
    name: Option<Scalar>,
    #[serde(alias = "link_status", alias = "state", alias = "oper_status")]
    status: Option<Scalar>,
    #[serde(alias = "bandwidth")]
    speed: Option<Scalar>,
    #[serde(alias = "desc")]
    description: Option<Scalar>,
    #[serde(alias = "mac", alias = "address", alias = "hardware_address")]
    mac_address: Option<Scalar>,
    mtu: Option<Scalar>,
    #[serde(alias = "ip", alias = "ipv4_address")]
    ip_address: Option<Scalar>,
    #[serde(alias = "prefix_len", alias = "mask", alias = "netmask")]
    prefix_length: Option<Scalar>,
}

impl WireInterface {
    fn into_rows(self) -> Option<Decoded> {
        let name = text(&self.name)?;
        let status = text(&self.status)
            .map(|s| s.parse::<LinkStatus>().unwrap_or_default())
            .unwrap_or(LinkStatus::Unknown);

        let mut decoded = Decoded {
            rows: Vec::with_capacity(2),
            skipped: 0,
        };
        decoded.rows.push(CacheRow::Interface(Interface {
            name: name.clone(),
            status,
            speed: text(&self.speed),
            description: text(&self.description),
            mac_address: mac(&self.mac_address),
            mtu: number(&self.mtu),
        }));

        if self.ip_address.is_some() {
            match self.ip_row(&name) {
                Some(row) => decoded.rows.push(CacheRow::IpAddress(row)),
                None => decoded.skipped += 1,
            }
        }
        Some(decoded)
    }

    fn ip_row(&self, name: &str) -> Option<IpAddressRow> {
        let raw = text(&self.ip_address)?;
        let (address, length) = match raw.split_once('/') {
            Some((addr, len)) => (addr.parse().ok()?, len.parse().ok()?),
            None => {
                let address: IpAddr = raw.parse().ok()?;
                let length = match text(&self.prefix_length) {
                    Some(len) if len.contains('.') => {
                        let prefix: IpPrefix = format!("{} {}", address, len).parse().ok()?;
                        prefix.prefix_len()
                    }
                    Some(len) => len.parse().ok()?,
                    None => return None,
                };
                (address, length)
            }
        };
        // Validates the length against the address family.
        IpPrefix::new(address, length).ok()?;
        Some(IpAddressRow::new(name, address, length))
    }
}

#[derive(Debug, Deserialize)]
struct WireArp {
    #[serde(alias = "address", alias = "ip")]
    ip_address: Option<Scalar>,
    #[serde(alias = "mac", alias = "hardware_addr")]
    mac_address: Option<Scalar>,
    #[serde(alias = "interface", alias = "port")]
    interface: Option<Scalar>,
    #[serde(alias = "age_minutes")]
    age: Option<Scalar>,
}

impl WireArp {
    fn into_rows(self) -> Option<Decoded> {
        Decoded::one(CacheRow::Arp(ArpEntry {
            ip_address: ip(&self.ip_address)?,
            mac_address: mac(&self.mac_address)?,
            interface: text(&self.interface),
            age: text(&self.age),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct WireRoute {
    #[serde(alias = "network", alias = "destination", alias = "route")]
    prefix: Option<Scalar>,
    #[serde(alias = "prefix_length", alias = "mask", alias = "prefix_len")]
    length: Option<Scalar>,
    #[serde(alias = "nexthop_ip", alias = "nexthop", alias = "gateway", alias = "via")]
    next_hop: Option<Scalar>,
    #[serde(alias = "nexthop_if", alias = "interface")]
    interface: Option<Scalar>,
    #[serde(alias = "admin_distance")]
    distance: Option<Scalar>,
    metric: Option<Scalar>,
    area: Option<Scalar>,
    #[serde(alias = "protocol", alias = "type")]
    route_type: Option<Scalar>,
    #[serde(alias = "aspath", alias = "path")]
    as_path: Option<Scalar>,
    #[serde(alias = "localpref", alias = "local_preference")]
    local_pref: Option<Scalar>,
    med: Option<Scalar>,
    origin: Option<Scalar>,
}

impl WireRoute {
    fn prefix(&self) -> Option<IpPrefix> {
        prefix(&self.prefix, &self.length)
    }

    fn into_static(self) -> Option<Decoded> {
        Decoded::one(CacheRow::StaticRoutes(StaticRoute {
            prefix: self.prefix()?,
            next_hop: ip(&self.next_hop),
            interface: text(&self.interface),
            distance: number(&self.distance),
            metric: number(&self.metric),
        }))
    }

    fn into_ospf(self) -> Option<Decoded> {
        Decoded::one(CacheRow::OspfRoutes(OspfRoute {
            prefix: self.prefix()?,
            next_hop: ip(&self.next_hop),
            interface: text(&self.interface),
            area: text(&self.area),
            route_type: text(&self.route_type),
            metric: number(&self.metric),
        }))
    }

    fn into_bgp(self) -> Option<Decoded> {
        Decoded::one(CacheRow::BgpRoutes(BgpRoute {
            prefix: self.prefix()?,
            next_hop: ip(&self.next_hop),
            as_path: text(&self.as_path),
            local_pref: number(&self.local_pref),
            med: number(&self.med).or_else(|| number(&self.metric)),
            origin: text(&self.origin),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct WireMac {
    #[serde(alias = "mac", alias = "destination_address", alias = "address")]
    mac_address: Option<Scalar>,
    #[serde(alias = "vlan_id")]
    vlan: Option<Scalar>,
    #[serde(alias = "port", alias = "destination_port", alias = "ports")]
    interface: Option<Scalar>,
    #[serde(alias = "type")]
    entry_type: Option<Scalar>,
}

impl WireMac {
    fn into_rows(self) -> Option<Decoded> {
        Decoded::one(CacheRow::Mac(MacEntry {
            mac_address: mac(&self.mac_address)?,
            // CPU and router entries carry `All` or `---` instead of a VLAN.
            vlan: number::<VlanId>(&self.vlan),
            interface: text(&self.interface),
            entry_type: text(&self.entry_type).map(|t| t.to_ascii_lowercase()),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct WireCdp {
    #[serde(alias = "local_port", alias = "local_intf")]
    local_interface: Option<Scalar>,
    #[serde(alias = "destination_host", alias = "neighbor", alias = "device_id")]
    neighbor_id: Option<Scalar>,
    #[serde(alias = "remote_port", alias = "port_id", alias = "neighbor_port")]
    neighbor_interface: Option<Scalar>,
    platform: Option<Scalar>,
    #[serde(alias = "management_ip", alias = "mgmt_address", alias = "mgmt_ip")]
    management_address: Option<Scalar>,
    capabilities: Option<Scalar>,
}

impl WireCdp {
    fn into_rows(self) -> Option<Decoded> {
        Decoded::one(CacheRow::CdpNeighbors(CdpNeighbor {
            local_interface: text(&self.local_interface)?,
            neighbor_id: text(&self.neighbor_id)?,
            neighbor_interface: text(&self.neighbor_interface),
            platform: text(&self.platform),
            management_address: ip(&self.management_address),
            capabilities: text(&self.capabilities),
        }))
    }
}
