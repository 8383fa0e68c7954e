//! Threat configuration registry

use crate::AlertError;
use notify::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::info;

/// Alerting parameters for one threat type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatConfig {
    /// Minimum confidence for an actionable threat (inclusive)
    pub threshold: f64,
    /// Name used in SMS text
    pub display_name: String,
    pub severity: Severity,
    pub recommendation: String,
}

impl ThreatConfig {
    pub fn new(
        threshold: f64,
        display_name: impl Into<String>,
        severity: Severity,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            threshold,
            display_name: display_name.into(),
            severity,
            recommendation: recommendation.into(),
        }
    }
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatConfigUpdate {
    pub threshold: Option<f64>,
    pub display_name: Option<String>,
    pub severity: Option<Severity>,
    pub recommendation: Option<String>,
}

impl ThreatConfigUpdate {
    pub fn threshold(threshold: f64) -> Self {
        Self {
            threshold: Some(threshold),
            ..Default::default()
        }
    }
}

fn validate_threshold(threshold: f64) -> Result<(), AlertError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(AlertError::InvalidThreshold(threshold))
    }
}

/// Built-in coastal threat types
pub fn default_threat_configs() -> BTreeMap<String, ThreatConfig> {
    [
        (
            "ALGAL_BLOOM",
            ThreatConfig::new(
                0.6,
                "Algal Bloom",
                Severity::Medium,
                "Monitor water quality and avoid affected areas",
            ),
        ),
        (
            "CYCLONE",
            ThreatConfig::new(
                0.7,
                "Cyclone",
                Severity::High,
                "Prepare for strong winds and heavy rainfall",
            ),
        ),
        (
            "EROSION",
            ThreatConfig::new(
                0.5,
                "Coastal Erosion",
                Severity::High,
                "Avoid coastal areas and monitor erosion rates",
            ),
        ),
        (
            "SEA_LEVEL",
            ThreatConfig::new(
                0.8,
                "Sea Level Rise",
                Severity::Medium,
                "Monitor water levels and prepare for potential flooding",
            ),
        ),
    ]
    .into_iter()
    .map(|(key, config)| (key.to_string(), config))
    .collect()
}

/// Runtime-mutable threat configurations, keyed by threat type
#[derive(Debug)]
pub struct ThreatConfigRegistry {
    configs: RwLock<BTreeMap<String, ThreatConfig>>,
}

impl ThreatConfigRegistry {
    /// Registry over the given configurations
    pub fn from_configs(
        configs: impl IntoIterator<Item = (String, ThreatConfig)>,
    ) -> Result<Self, AlertError> {
        let configs: BTreeMap<_, _> = configs.into_iter().collect();
        for config in configs.values() {
            validate_threshold(config.threshold)?;
        }
        Ok(Self {
            configs: RwLock::new(configs),
        })
    }

    /// Registry with the built-in threat types
    pub fn with_defaults() -> Self {
        Self {
            configs: RwLock::new(default_threat_configs()),
        }
    }

    pub fn get(&self, threat_type: &str) -> Result<ThreatConfig, AlertError> {
        let configs = self.read()?;
        configs
            .get(threat_type)
            .cloned()
            .ok_or_else(|| AlertError::UnknownThreatType(threat_type.to_string()))
    }

    /// Merge `update` into an existing config. Never creates new types.
    pub fn update(
        &self,
        threat_type: &str,
        update: ThreatConfigUpdate,
    ) -> Result<ThreatConfig, AlertError> {
        if let Some(threshold) = update.threshold {
            validate_threshold(threshold)?;
        }

        let mut configs = self
            .configs
            .write()
            .map_err(|e| AlertError::Store(format!("Lock error: {}", e)))?;
        let config = configs
            .get_mut(threat_type)
            .ok_or_else(|| AlertError::UnknownThreatType(threat_type.to_string()))?;

        if let Some(threshold) = update.threshold {
            config.threshold = threshold;
        }
        if let Some(display_name) = update.display_name {
            config.display_name = display_name;
        }
        if let Some(severity) = update.severity {
            config.severity = severity;
        }
        if let Some(recommendation) = update.recommendation {
            config.recommendation = recommendation;
        }

        info!("Updated threat config for {}: {:?}", threat_type, config);
        Ok(config.clone())
    }

    /// Snapshot of all configs, ordered by threat type
    pub fn list_all(&self) -> Result<BTreeMap<String, ThreatConfig>, AlertError> {
        Ok(self.read()?.clone())
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, ThreatConfig>>, AlertError> {
        self.configs
            .read()
            .map_err(|e| AlertError::Store(format!("Lock error: {}", e)))
    }
}

impl Default for ThreatConfigRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let registry = ThreatConfigRegistry::with_defaults();
        let all = registry.list_all().unwrap();

        let keys: Vec<_> = all.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["ALGAL_BLOOM", "CYCLONE", "EROSION", "SEA_LEVEL"]);
        assert_eq!(registry.get("EROSION").unwrap().threshold, 0.5);
        assert_eq!(registry.get("CYCLONE").unwrap().severity, Severity::High);
    }

    #[test]
    fn test_partial_update_merges() {
        let registry = ThreatConfigRegistry::with_defaults();
        let updated = registry
            .update("CYCLONE", ThreatConfigUpdate::threshold(0.9))
            .unwrap();

        assert_eq!(updated.threshold, 0.9);
        assert_eq!(updated.display_name, "Cyclone");
        assert_eq!(registry.get("CYCLONE").unwrap(), updated);
    }

    #[test]
    fn test_unknown_type_not_created() {
        let registry = ThreatConfigRegistry::with_defaults();
        let err = registry
            .update("TSUNAMI", ThreatConfigUpdate::threshold(0.5))
            .unwrap_err();

        assert!(matches!(err, AlertError::UnknownThreatType(t) if t == "TSUNAMI"));
        assert!(registry.get("TSUNAMI").is_err());
        assert_eq!(registry.list_all().unwrap().len(), 4);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let registry = ThreatConfigRegistry::with_defaults();
        assert!(matches!(
            registry.update("EROSION", ThreatConfigUpdate::threshold(1.5)),
            Err(AlertError::InvalidThreshold(_))
        ));
        assert!(registry
            .update("EROSION", ThreatConfigUpdate::threshold(f64::NAN))
            .is_err());
        assert_eq!(registry.get("EROSION").unwrap().threshold, 0.5);

        let bad = [(
            "X".to_string(),
            ThreatConfig::new(-0.1, "X", Severity::Low, "none"),
        )];
        assert!(ThreatConfigRegistry::from_configs(bad).is_err());
    }
}
