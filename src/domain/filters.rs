//! Named screening filters.
//!
//! A filter is an opaque mapping of criterion name to threshold string. The
//! domain never interprets the criteria; they are handed to the universe port
//! unchanged.

use crate::domain::error::AlphaflexError;
use std::collections::BTreeMap;

pub type Criteria = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    filters: BTreeMap<String, Criteria>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, criteria: Criteria) {
        self.filters.insert(name.into(), criteria);
    }

    pub fn get(&self, name: &str) -> Option<&Criteria> {
        self.filters.get(name)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Criteria)> {
        self.filters.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.keys().map(String::as_str).collect()
    }

    /// Subset of this set by name. Unknown names are a configuration error.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<FilterSet, AlphaflexError> {
        let mut selected = FilterSet::new();
        for name in names {
            let name = name.as_ref();
            let criteria = self
                .filters
                .get(name)
                .ok_or_else(|| AlphaflexError::ConfigInvalid {
                    section: "universe".into(),
                    key: "filters".into(),
                    reason: format!("unknown filter '{name}' (known: {})", self.names().join(", ")),
                })?;
            selected.insert(name, criteria.clone());
        }
        Ok(selected)
    }

    /// The stock screens the portfolio is built from by default.
    pub fn builtin() -> Self {
        let mut set = FilterSet::new();
        set.insert(
            "High Growth",
            criteria(&[
                ("Market Cap.", "+Large (over $10bln)"),
                ("EPS growthqtr over qtr", "High (>25%)"),
                ("EPS growthnext year", "Over 30%"),
                ("EPS growththis year", "Over 30%"),
                ("Sales growthqtr over qtr", "Over 30%"),
                ("Average Volume", "Over 1M"),
                ("RSI (14)", "Not Oversold (>50)"),
                ("200-Day Simple Moving Average", "Price above SMA200"),
                ("Debt/Equity", "Under 0.5"),
                ("Gross Margin", "Over 40%"),
                ("Country", "USA"),
            ]),
        );
        set.insert(
            "High Sales Growth",
            criteria(&[
                ("Market Cap.", "+Mid (over $2bln)"),
                ("Debt/Equity", "Under 0.3"),
                ("Gross Margin", "Over 60%"),
                ("Return on Equity", "Over +25%"),
                ("Sales growthpast 5 years", "Over 20%"),
                ("Sales growthqtr over qtr", "Over 25%"),
                ("Average Volume", "Over 500K"),
                ("InstitutionalOwnership", "Over 80%"),
                ("Price", "Over $10"),
                ("Float Short", "Under 5%"),
                ("Country", "USA"),
            ]),
        );
        set.insert(
            "Buy and Hold",
            criteria(&[
                ("Market Cap.", "+Mid (over $2bln)"),
                ("Current Ratio", "Over 2"),
                ("EPS growthnext 5 years", "Over 15%"),
                ("PEG", "Under 2"),
                ("Return on Equity", "Over +15%"),
                ("Beta", "Under 1.5"),
                ("20-Day Simple Moving Average", "Price above SMA20"),
                ("Country", "USA"),
            ]),
        );
        set.insert(
            "Bullish",
            criteria(&[
                ("Market Cap.", "+Mid (over $2bln)"),
                ("EPS growthpast 5 years", "Positive (>0%)"),
                ("EPS growthqtr over qtr", "Over 20%"),
                ("EPS growththis year", "Over 25%"),
                ("EPS growthnext year", "Over 15%"),
                ("EPS growthnext 5 years", "Over 15%"),
                ("Return on Equity", "Over +15%"),
                ("InstitutionalOwnership", "Over 50%"),
                ("Price", "Over $15"),
                ("52-Week High/Low", "90% or more above Low"),
                ("RSI (14)", "Not Oversold (>50)"),
                ("50-Day Simple Moving Average", "Price above SMA50"),
                ("Country", "USA"),
            ]),
        );
        set.insert(
            "ALPHA_SAFE",
            criteria(&[
                ("Market Cap.", "+Large (over $10bln)"),
                ("Current Ratio", "Over 1.5"),
                ("Dividend Yield", "Over 1%"),
                ("P/E", "Under 20"),
                ("Return on Equity", "Over +10%"),
                ("Institutional Ownership", "Over 60%"),
                ("200-Day Simple Moving Average", "Price above SMA200"),
                ("Country", "USA"),
            ]),
        );
        set
    }
}

fn criteria(pairs: &[(&str, &str)]) -> Criteria {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
