//! Generated text fields of the commercial circuit forms, plus the Raisecom
//! port selects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::catalog::PortCatalog;

/// Port speed only offered on 10G Raisecom models.
pub const TEN_GIG_SPEED: &str = "10000M";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitType {
    Internet,
    TransparentLan,
    Vpls,
}

impl CircuitType {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitType::Internet => "internet",
            CircuitType::TransparentLan => "transparent_lan",
            CircuitType::Vpls => "vpls",
        }
    }

    fn spacer(self) -> &'static str {
        match self {
            CircuitType::Internet => ".............D....... ",
            CircuitType::TransparentLan => ".............T....... ",
            CircuitType::Vpls => "...............V..... ",
        }
    }

    fn service_name(self) -> &'static str {
        match self {
            CircuitType::Internet => "Internet",
            CircuitType::TransparentLan => "TLS",
            CircuitType::Vpls => "VPLS",
        }
    }
}

impl fmt::Display for CircuitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircuitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internet" => Ok(CircuitType::Internet),
            "transparent_lan" => Ok(CircuitType::TransparentLan),
            "vpls" => Ok(CircuitType::Vpls),
            other => Err(format!("unknown circuit type: {other}")),
        }
    }
}

/// e.g. `.............D....... ACME - 100M Internet - 12-ABCD-345`
pub fn interface_description(
    circuit: CircuitType,
    customer: &str,
    bandwidth: &str,
    circuit_id: &str,
) -> String {
    format!(
        "{}{} - {}M {} - {}",
        circuit.spacer(),
        customer,
        bandwidth,
        circuit.service_name(),
        circuit_id
    )
}

fn circuit_segments(circuit_id: &str) -> Vec<&str> {
    circuit_id.split('-').collect()
}

/// Customer initials followed by circuit ID segments 0 and 2. A one-word
/// customer contributes its first three letters, uppercased. Missing
/// segments contribute nothing.
pub fn bgp_password(customer: &str, circuit_id: &str) -> String {
    let words: Vec<&str> = customer.split(' ').collect();
    let initials: String = if words.len() == 1 {
        words[0].chars().take(3).collect::<String>().to_uppercase()
    } else {
        words.iter().filter_map(|w| w.chars().next()).collect()
    };
    let segments = circuit_segments(circuit_id);
    let segment = |i: usize| segments.get(i).copied().unwrap_or_default();
    format!("{}{}{}", initials, segment(0), segment(2))
}

/// Layer 2 name for pseudowires and VPLS bridge domains:
/// customer without spaces, `_`, first three circuit ID segments.
pub fn l2_name(customer: &str, circuit_id: &str) -> String {
    let customer: String = customer.chars().filter(|c| *c != ' ').collect();
    let circuit: String = circuit_segments(circuit_id).into_iter().take(3).collect();
    format!("{customer}_{circuit}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaisecomPorts {
    pub uplink_ports: Vec<String>,
    pub client_ports: Vec<String>,
    pub ten_gig: bool,
}

/// Uplink and client port options for a Raisecom model.
pub fn raisecom_ports(catalog: &PortCatalog, model: &str) -> Option<RaisecomPorts> {
    let entry = catalog.raisecom(model)?;
    Some(RaisecomPorts {
        uplink_ports: entry.uplink_ports.clone(),
        client_ports: entry.client_ports.clone(),
        ten_gig: entry.bandwidth == "10G",
    })
}

/// Adjust port speed options for a model: 10G models get `10000M` first,
/// others lose it.
pub fn port_speeds(current: &[String], ten_gig: bool) -> Vec<String> {
    let mut speeds: Vec<String> = current
        .iter()
        .filter(|s| s.as_str() != TEN_GIG_SPEED)
        .cloned()
        .collect();
    if ten_gig {
        speeds.insert(0, TEN_GIG_SPEED.to_string());
    }
    speeds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptions_per_circuit_type() {
        assert_eq!(
            interface_description(CircuitType::Internet, "ACME Corp", "100", "12-ABCD-345"),
            ".............D....... ACME Corp - 100M Internet - 12-ABCD-345"
        );
        assert_eq!(
            interface_description(CircuitType::TransparentLan, "ACME", "50", "1-2-3"),
            ".............T....... ACME - 50M TLS - 1-2-3"
        );
        assert_eq!(
            interface_description(CircuitType::Vpls, "ACME", "10", "X"),
            "...............V..... ACME - 10M VPLS - X"
        );
    }

    #[test]
    fn circuit_type_parses_route_names() {
        assert_eq!("vpls".parse::<CircuitType>(), Ok(CircuitType::Vpls));
        assert_eq!(
            "transparent_lan".parse::<CircuitType>(),
            Ok(CircuitType::TransparentLan)
        );
        assert!("oh_srx".parse::<CircuitType>().is_err());
    }

    #[test]
    fn bgp_password_from_initials_and_segments() {
        assert_eq!(bgp_password("acme", "12-ABCD-345-XX"), "ACM12345");
        assert_eq!(bgp_password("Big River Foods", "12-ABCD-345"), "BRF12345");
        assert_eq!(bgp_password("Al", "7-Q"), "AL7");
        assert_eq!(bgp_password("", ""), "");
    }

    #[test]
    fn l2_name_joins_first_three_segments() {
        assert_eq!(l2_name("Big River Foods", "12-ABCD-345-XX"), "BigRiverFoods_12ABCD345");
        assert_eq!(l2_name("ACME", "12"), "ACME_12");
    }

    #[test]
    fn raisecom_models() {
        let catalog = PortCatalog::builtin().unwrap();
        let ten = raisecom_ports(&catalog, "ISCOM2948GF-4C").unwrap();
        assert!(ten.ten_gig);
        assert_eq!(ten.uplink_ports[0], "tengigabitethernet 1/2/1");
        let one = raisecom_ports(&catalog, "ISCOM2924GF-4C").unwrap();
        assert!(!one.ten_gig);
        assert_eq!(one.client_ports.len(), 4);
        assert!(raisecom_ports(&catalog, "nope").is_none());
    }

    #[test]
    fn ten_gig_speed_added_once_and_removed() {
        let base: Vec<String> = ["1000M", "100M"].iter().map(|s| s.to_string()).collect();
        let ten = port_speeds(&base, true);
        assert_eq!(ten, vec!["10000M", "1000M", "100M"]);
        assert_eq!(port_speeds(&ten, true), ten);
        assert_eq!(port_speeds(&ten, false), base);
    }
}
