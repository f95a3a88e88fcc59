use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use anyhow::Result;
use serde::Serialize;

use crate::registry::Capability;

/// Which external capabilities answered a trivial invocation at startup
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProbeReport {
    pub capabilities: BTreeMap<Capability, bool>,
    /// Why a capability is unavailable
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<Capability, String>,
}

impl ProbeReport {
    pub fn is_available(&self, capability: Capability) -> bool {
        self.capabilities.get(&capability).copied().unwrap_or(false)
    }

    pub fn record(&mut self, capability: Capability, outcome: Result<()>) {
        match outcome {
            Ok(()) => {
                self.capabilities.insert(capability, true);
                self.failures.remove(&capability);
            }
            Err(e) => {
                self.capabilities.insert(capability, false);
                self.failures.insert(capability, format!("{:#}", e));
            }
        }
    }

    pub fn available(&self) -> Vec<Capability> {
        self.capabilities
            .iter()
            .filter(|(_, available)| **available)
            .map(|(capability, _)| *capability)
            .collect()
    }
}

/// Probe every capability once. Never fails: a capability that errors or
/// panics is recorded as unavailable.
pub fn probe() -> ProbeReport {
    let mut report = ProbeReport::default();

    for capability in Capability::ALL {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| check(capability))) {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("{} probe panicked", capability.as_str())),
        };

        match &outcome {
            Ok(()) => log::debug!("Capability {} available", capability.as_str()),
            Err(e) => log::warn!("Capability {} unavailable: {:#}", capability.as_str(), e),
        }
        report.record(capability, outcome);
    }

    report
}

fn check(capability: Capability) -> Result<()> {
    match capability {
        #[cfg(feature = "pdf")]
        Capability::PdfReader => crate::pdf_extractor::PdfExtractor::probe(),
        #[cfg(not(feature = "pdf"))]
        Capability::PdfReader => anyhow::bail!("PDF reader not available (feature \"pdf\" not enabled)"),

        Capability::OoxmlReader => crate::document_parser::probe(),

        #[cfg(feature = "docx")]
        Capability::OoxmlWriter => crate::docx_writer::probe(),
        #[cfg(not(feature = "docx"))]
        Capability::OoxmlWriter => anyhow::bail!("DOCX writer not available (feature \"docx\" not enabled)"),

        #[cfg(feature = "xlsx")]
        Capability::SpreadsheetEngine => crate::xlsx_writer::probe(),
        #[cfg(not(feature = "xlsx"))]
        Capability::SpreadsheetEngine => {
            anyhow::bail!("Spreadsheet engine not available (feature \"xlsx\" not enabled)")
        }

        #[cfg(feature = "xlsx")]
        Capability::TabularEngine => crate::content::probe_tabular(),
        #[cfg(not(feature = "xlsx"))]
        Capability::TabularEngine => anyhow::bail!("Tabular engine not available (feature \"xlsx\" not enabled)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_covers_every_capability() {
        let report = probe();
        assert_eq!(report.capabilities.len(), Capability::ALL.len());
        assert!(report.is_available(Capability::OoxmlReader));
    }

    #[cfg(all(feature = "pdf", feature = "docx", feature = "xlsx"))]
    #[test]
    fn test_probe_with_default_features() {
        let report = probe();
        assert_eq!(report.available(), Capability::ALL.to_vec());
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_record_failure_and_recovery() {
        let mut report = ProbeReport::default();
        report.record(Capability::PdfReader, Err(anyhow::anyhow!("missing")));
        assert!(!report.is_available(Capability::PdfReader));
        assert_eq!(report.failures[&Capability::PdfReader], "missing");

        report.record(Capability::PdfReader, Ok(()));
        assert!(report.is_available(Capability::PdfReader));
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_unprobed_capability_is_unavailable() {
        assert!(!ProbeReport::default().is_available(Capability::TabularEngine));
    }

    #[test]
    fn test_report_serializes_kebab_case_keys() {
        let mut report = ProbeReport::default();
        report.record(Capability::SpreadsheetEngine, Ok(()));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["capabilities"]["spreadsheet-engine"], true);
        assert!(json.get("failures").is_none());
    }
}
