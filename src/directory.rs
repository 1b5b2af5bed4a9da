//! Instrument name and code directory.

use crate::defs::INSTRUMENT_CODE_WIDTH;
use crate::errors::ProviderError;
use crate::provider::{Market, Provider};

use std::collections::{BTreeMap, HashMap};

/// Bidirectional map between instrument display names and provider codes.
///
/// Built once after login and never mutated afterwards, so it can be shared
/// between connection threads without locking.
#[derive(Clone, Debug, Default)]
pub struct NameCodeDirectory {
    name_to_code: BTreeMap<String, String>,
    code_to_name: HashMap<String, String>,
}

impl NameCodeDirectory {
    /// Enumerates every market of the provider and records each instrument.
    ///
    /// When two codes share a display name the later one wins the name lookup;
    /// both remain reachable by code.
    pub fn build(provider: &dyn Provider) -> Result<Self, ProviderError> {
        let mut entries = Vec::new();
        for market in Market::ALL {
            let codes = provider.code_list_by_market(market)?;
            log::debug!("Market {:?} lists {} codes", market, codes.len());
            for code in codes.into_iter().filter(|c| !c.trim().is_empty()) {
                match provider.master_code_name(&code) {
                    Some(name) => entries.push((name, code)),
                    None => log::warn!("No name for instrument code {}", code),
                }
            }
        }
        let directory = Self::from_entries(entries);
        log::info!("Instrument directory built: {} instruments", directory.len());
        Ok(directory)
    }

    /// Builds a directory from `(name, code)` pairs.
    pub fn from_entries<I, N, C>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, C)>,
        N: Into<String>,
        C: Into<String>,
    {
        let mut directory = Self::default();
        for (name, code) in entries {
            let name = name.into().trim().to_string();
            let code = code.into().trim().to_string();
            if let Some(previous) = directory.name_to_code.insert(name.clone(), code.clone()) {
                log::debug!("Name {} maps to {} and {}", name, previous, code);
            }
            directory.code_to_name.insert(code, name);
        }
        directory
    }

    /// Resolves user input to an instrument code.
    ///
    /// Known names map to their code. Anything else is returned unchanged,
    /// except that short all-digit input is zero-padded to the code width.
    pub fn resolve(&self, name_or_code: &str) -> String {
        let input = name_or_code.trim();
        if let Some(code) = self.name_to_code.get(input) {
            return code.clone();
        }
        if !input.is_empty()
            && input.len() < INSTRUMENT_CODE_WIDTH
            && input.chars().all(|c| c.is_ascii_digit())
        {
            return format!("{:0>width$}", input, width = INSTRUMENT_CODE_WIDTH);
        }
        input.to_string()
    }

    /// Looks up the display name of a code.
    pub fn name_of(&self, code: &str) -> Option<&str> {
        self.code_to_name.get(code).map(String::as_str)
    }

    /// Name to code view, ordered by name. This is what `CODEMAP` returns.
    pub fn names(&self) -> &BTreeMap<String, String> {
        &self.name_to_code
    }

    /// Number of distinct codes.
    pub fn len(&self) -> usize {
        self.code_to_name.len()
    }

    /// Returns `true` if the directory holds no instruments.
    pub fn is_empty(&self) -> bool {
        self.code_to_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProvider;

    fn sample() -> NameCodeDirectory {
        NameCodeDirectory::from_entries([("삼성전자", "005930"), ("카카오", "035720")])
    }

    #[test]
    fn test_resolve_name_to_code() {
        let dir = sample();
        assert_eq!(dir.resolve("삼성전자"), "005930");
        assert_eq!(dir.resolve(" 카카오 "), "035720");
    }

    #[test]
    fn test_resolve_passes_through_codes_and_unknown_names() {
        let dir = sample();
        assert_eq!(dir.resolve("005930"), "005930");
        assert_eq!(dir.resolve("없는종목"), "없는종목");
    }

    #[test]
    fn test_resolve_pads_short_numeric_codes() {
        let dir = sample();
        assert_eq!(dir.resolve("5930"), "005930");
        assert_eq!(dir.resolve("A5930"), "A5930");
    }

    #[test]
    fn test_reverse_lookup() {
        let dir = sample();
        assert_eq!(dir.name_of("035720"), Some("카카오"));
        assert_eq!(dir.name_of(&dir.resolve("5930")), Some("삼성전자"));
        assert_eq!(dir.name_of("999999"), None);
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_build_enumerates_all_markets() {
        let provider = ScriptedProvider::new()
            .with_instrument(Market::Kospi, "005930", "삼성전자")
            .with_instrument(Market::Kosdaq, "247540", "에코프로비엠");

        let dir = NameCodeDirectory::build(&provider).unwrap();
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.resolve("에코프로비엠"), "247540");
    }
}
