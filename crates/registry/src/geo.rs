//! Geographic enrichment contract and the static country -> continent table.
//!
//! The registry never resolves hosts itself. A [`GeoLookup`] is injected at
//! construction and consulted once per registration; when it fails the node
//! is still registered with [`GeoInfo::unknown`] geography.

use std::collections::HashMap;
use std::fmt;

use auto_impl::auto_impl;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Country code used when enrichment is unavailable.
pub const UNKNOWN_COUNTRY: &str = "XX";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeoError {
    #[error("no geo data for host {0}")]
    NotFound(String),
    #[error("geo lookup unavailable: {0}")]
    Unavailable(String),
}

/// Enrichment data supplied by the external lookup for one host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub country_code: String,
    pub country_name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub isp: String,
    #[serde(default)]
    pub asn: Option<u32>,
    #[serde(default)]
    pub as_org: Option<String>,
}

impl GeoInfo {
    /// Placeholder geography for nodes whose enrichment failed.
    pub fn unknown() -> Self {
        Self {
            country_code: UNKNOWN_COUNTRY.to_string(),
            country_name: "Unknown".to_string(),
            region: None,
            city: None,
            latitude: None,
            longitude: None,
            timezone: None,
            isp: "Unknown".to_string(),
            asn: None,
            as_org: None,
        }
    }

    pub fn continent(&self) -> Continent {
        Continent::from_country(&self.country_code)
    }
}

/// Resolves a relay host to its geography and upstream network.
#[auto_impl(&, Box, Arc)]
pub trait GeoLookup: Send + Sync {
    fn lookup(&self, host: &str) -> Result<GeoInfo, GeoError>;
}

/// Fixed host -> geography table.
///
/// Hosts missing from the table fail with [`GeoError::NotFound`], which the
/// registry treats as degraded enrichment.
#[derive(Debug, Clone, Default)]
pub struct StaticGeoLookup {
    entries: HashMap<String, GeoInfo>,
}

impl StaticGeoLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, host: impl Into<String>, geo: GeoInfo) -> Self {
        self.insert(host, geo);
        self
    }

    pub fn insert(&mut self, host: impl Into<String>, geo: GeoInfo) {
        self.entries.insert(host.into(), geo);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, GeoInfo)> for StaticGeoLookup {
    fn from_iter<I: IntoIterator<Item = (String, GeoInfo)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl GeoLookup for StaticGeoLookup {
    fn lookup(&self, host: &str) -> Result<GeoInfo, GeoError> {
        self.entries
            .get(host)
            .cloned()
            .ok_or_else(|| GeoError::NotFound(host.to_string()))
    }
}

/// Continent bucket, derived from the country code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Continent {
    #[serde(rename = "AF")]
    Africa,
    #[serde(rename = "AN")]
    Antarctica,
    #[serde(rename = "AS")]
    Asia,
    #[serde(rename = "EU")]
    Europe,
    #[serde(rename = "NA")]
    NorthAmerica,
    #[serde(rename = "OC")]
    Oceania,
    #[serde(rename = "SA")]
    SouthAmerica,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Continent {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Africa => "AF",
            Self::Antarctica => "AN",
            Self::Asia => "AS",
            Self::Europe => "EU",
            Self::NorthAmerica => "NA",
            Self::Oceania => "OC",
            Self::SouthAmerica => "SA",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "AF" => Some(Self::Africa),
            "AN" => Some(Self::Antarctica),
            "AS" => Some(Self::Asia),
            "EU" => Some(Self::Europe),
            "NA" => Some(Self::NorthAmerica),
            "OC" => Some(Self::Oceania),
            "SA" => Some(Self::SouthAmerica),
            "UNKNOWN" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Map an ISO 3166-1 alpha-2 country code to its continent.
    pub fn from_country(country_code: &str) -> Self {
        match country_code.to_ascii_uppercase().as_str() {
            "DZ" | "AO" | "BJ" | "BW" | "BF" | "BI" | "CV" | "CM" | "CF" | "TD" | "KM" | "CG"
            | "CD" | "CI" | "DJ" | "EG" | "GQ" | "ER" | "SZ" | "ET" | "GA" | "GM" | "GH"
            | "GN" | "GW" | "KE" | "LS" | "LR" | "LY" | "MG" | "MW" | "ML" | "MR" | "MU"
            | "YT" | "MA" | "MZ" | "NA" | "NE" | "NG" | "RE" | "RW" | "SH" | "ST" | "SN"
            | "SC" | "SL" | "SO" | "ZA" | "SS" | "SD" | "TZ" | "TG" | "TN" | "UG" | "EH"
            | "ZM" | "ZW" => Self::Africa,

            "AQ" | "BV" | "GS" | "HM" | "TF" => Self::Antarctica,

            "AF" | "AM" | "AZ" | "BH" | "BD" | "BT" | "BN" | "KH" | "CN" | "CY" | "GE"
            | "HK" | "IN" | "ID" | "IR" | "IQ" | "IL" | "JP" | "JO" | "KZ" | "KW" | "KG"
            | "LA" | "LB" | "MO" | "MY" | "MV" | "MN" | "MM" | "NP" | "KP" | "OM" | "PK"
            | "PS" | "PH" | "QA" | "SA" | "SG" | "KR" | "LK" | "SY" | "TW" | "TJ" | "TH"
            | "TL" | "TR" | "TM" | "AE" | "UZ" | "VN" | "YE" | "IO" | "CC" | "CX" => Self::Asia,

            "AL" | "AD" | "AT" | "BY" | "BE" | "BA" | "BG" | "HR" | "CZ" | "DK" | "EE"
            | "FO" | "FI" | "FR" | "DE" | "GI" | "GR" | "GG" | "HU" | "IS" | "IE" | "IM"
            | "IT" | "JE" | "XK" | "LV" | "LI" | "LT" | "LU" | "MT" | "MD" | "MC" | "ME"
            | "NL" | "MK" | "NO" | "PL" | "PT" | "RO" | "RU" | "SM" | "RS" | "SK" | "SI"
            | "ES" | "SJ" | "SE" | "CH" | "UA" | "GB" | "VA" | "AX" => Self::Europe,

            "AI" | "AG" | "AW" | "BS" | "BB" | "BZ" | "BM" | "BQ" | "VG" | "CA" | "KY"
            | "CR" | "CU" | "CW" | "DM" | "DO" | "SV" | "GL" | "GD" | "GP" | "GT" | "HT"
            | "HN" | "JM" | "MQ" | "MX" | "MS" | "NI" | "PA" | "PR" | "BL" | "KN" | "LC"
            | "MF" | "PM" | "VC" | "SX" | "TT" | "TC" | "US" | "VI" | "UM" => {
                Self::NorthAmerica
            }

            "AS" | "AU" | "CK" | "FJ" | "PF" | "GU" | "KI" | "MH" | "FM" | "NR" | "NC"
            | "NZ" | "NU" | "NF" | "MP" | "PW" | "PG" | "PN" | "WS" | "SB" | "TK" | "TO"
            | "TV" | "VU" | "WF" => Self::Oceania,

            "AR" | "BO" | "BR" | "CL" | "CO" | "EC" | "FK" | "GF" | "GY" | "PY" | "PE"
            | "SR" | "UY" | "VE" => Self::SouthAmerica,

            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Continent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
