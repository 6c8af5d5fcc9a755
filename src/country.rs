// src/country.rs
//! Target economy of the report. Feeds disagree on which field names the
//! economy (currency code, ISO country code, or a country name), so matching
//! accepts all three.

use anyhow::{anyhow, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetCountry {
    pub currency: &'static str,
    pub country_code: &'static str,
    pub country_name: &'static str,
    pub flag: &'static str,
    /// Country id understood by the markup calendar widget.
    pub widget_id: &'static str,
}

const KNOWN: &[TargetCountry] = &[
    TargetCountry {
        currency: "USD",
        country_code: "US",
        country_name: "United States",
        flag: "🇺🇸",
        widget_id: "5",
    },
    TargetCountry {
        currency: "EUR",
        country_code: "EU",
        country_name: "Euro Zone",
        flag: "🇪🇺",
        widget_id: "72",
    },
    TargetCountry {
        currency: "GBP",
        country_code: "GB",
        country_name: "United Kingdom",
        flag: "🇬🇧",
        widget_id: "4",
    },
    TargetCountry {
        currency: "JPY",
        country_code: "JP",
        country_name: "Japan",
        flag: "🇯🇵",
        widget_id: "35",
    },
    TargetCountry {
        currency: "CAD",
        country_code: "CA",
        country_name: "Canada",
        flag: "🇨🇦",
        widget_id: "6",
    },
    TargetCountry {
        currency: "AUD",
        country_code: "AU",
        country_name: "Australia",
        flag: "🇦🇺",
        widget_id: "25",
    },
    TargetCountry {
        currency: "NZD",
        country_code: "NZ",
        country_name: "New Zealand",
        flag: "🇳🇿",
        widget_id: "43",
    },
    TargetCountry {
        currency: "CHF",
        country_code: "CH",
        country_name: "Switzerland",
        flag: "🇨🇭",
        widget_id: "12",
    },
    TargetCountry {
        currency: "CNY",
        country_code: "CN",
        country_name: "China",
        flag: "🇨🇳",
        widget_id: "37",
    },
];

impl Default for TargetCountry {
    fn default() -> Self {
        KNOWN[0].clone()
    }
}

impl TargetCountry {
    pub fn from_currency(code: &str) -> Result<Self> {
        let code = code.trim();
        KNOWN
            .iter()
            .find(|c| c.currency.eq_ignore_ascii_case(code))
            .cloned()
            .ok_or_else(|| anyhow!("unsupported target currency: {code}"))
    }

    /// `country` may hold a currency code, a country code or a country name.
    pub fn matches(&self, country: Option<&str>, currency: Option<&str>) -> bool {
        let by_country = country.map(str::trim).is_some_and(|c| {
            c.eq_ignore_ascii_case(self.currency)
                || c.eq_ignore_ascii_case(self.country_code)
                || c.eq_ignore_ascii_case(self.country_name)
        });
        let by_currency = currency
            .map(str::trim)
            .is_some_and(|c| c.eq_ignore_ascii_case(self.currency));
        by_country || by_currency
    }
}
