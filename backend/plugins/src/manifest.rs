/// Handler manifest: what a handler declares about itself at registration.
use std::collections::BTreeMap;

use lisa_hooks::RuleRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::{CronRecord, IntentRecord};

fn enabled_by_default() -> bool {
    true
}

/// An intent served by the handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentDecl {
    pub entry_point: String,
    /// Capability key for "what can you do" listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i_can: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerManifest {
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Capability key describing the whole handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i_can: Option<String>,
    #[serde(default)]
    pub intents: BTreeMap<String, IntentDecl>,
    #[serde(default)]
    pub rules: Vec<RuleRecord>,
    #[serde(default)]
    pub crons: Vec<CronRecord>,
    #[serde(default)]
    pub global_vars: Map<String, Value>,
    #[serde(default)]
    pub session_vars: Map<String, Value>,
}

impl HandlerManifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            i_can: None,
            intents: BTreeMap::new(),
            rules: Vec::new(),
            crons: Vec::new(),
            global_vars: Map::new(),
            session_vars: Map::new(),
        }
    }

    pub fn with_i_can(mut self, key: impl Into<String>) -> Self {
        self.i_can = Some(key.into());
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>, entry_point: impl Into<String>, i_can: Option<&str>) -> Self {
        self.intents.insert(
            intent.into(),
            IntentDecl {
                entry_point: entry_point.into(),
                i_can: i_can.map(str::to_string),
            },
        );
        self
    }

    pub fn with_session_var(mut self, name: impl Into<String>, default: Value) -> Self {
        self.session_vars.insert(name.into(), default);
        self
    }

    pub fn with_global_var(mut self, name: impl Into<String>, default: Value) -> Self {
        self.global_vars.insert(name.into(), default);
        self
    }

    pub fn with_rule(mut self, rule: RuleRecord) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_cron(mut self, cron: CronRecord) -> Self {
        self.crons.push(cron);
        self
    }

    /// Validate the manifest for required fields.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Handler manifest missing 'name'");
        }
        for (intent, decl) in &self.intents {
            if decl.entry_point.is_empty() {
                anyhow::bail!("Intent '{}' of handler '{}' has no entry point", intent, self.name);
            }
        }
        Ok(())
    }

    /// Intent records owned by this handler, all stamped with its name.
    pub fn intent_records(&self) -> Vec<IntentRecord> {
        self.intents
            .iter()
            .map(|(name, decl)| IntentRecord {
                name: name.clone(),
                handler: self.name.clone(),
                entry_point: decl.entry_point.clone(),
                enabled: self.enabled,
                i_can: decl.i_can.clone(),
            })
            .collect()
    }

    pub fn rule_records(&self) -> Vec<RuleRecord> {
        self.rules
            .iter()
            .cloned()
            .map(|mut rule| {
                rule.handler = Some(self.name.clone());
                rule.enabled &= self.enabled;
                rule
            })
            .collect()
    }

    pub fn cron_records(&self) -> Vec<CronRecord> {
        self.crons
            .iter()
            .cloned()
            .map(|mut cron| {
                cron.handler = self.name.clone();
                cron.enabled &= self.enabled;
                cron
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_yaml_manifest() {
        let yaml = r#"
name: Weather
iCan: weather_i_can
intents:
  weather_today:
    entryPoint: today
    iCan: weather_today_i_can
crons:
  - name: morning_report
    handler: ignored
    entryPoint: today
    schedule: "0 0 7 * * *"
sessionVars:
  city: Paris
"#;
        let manifest: HandlerManifest = serde_yaml::from_str(yaml).unwrap();
        manifest.validate().unwrap();
        assert!(manifest.enabled);
        let intents = manifest.intent_records();
        assert_eq!(intents[0].handler, "Weather");
        assert_eq!(intents[0].entry_point, "today");
        assert_eq!(manifest.cron_records()[0].handler, "Weather");
        assert_eq!(manifest.session_vars["city"], json!("Paris"));
    }

    #[test]
    fn test_disabled_manifest_disables_records() {
        let mut manifest = HandlerManifest::new("Lights").with_intent("lights_off", "off", None);
        manifest.enabled = false;
        assert!(!manifest.intent_records()[0].enabled);
    }

    #[test]
    fn test_validate() {
        assert!(HandlerManifest::new(" ").validate().is_err());
        assert!(HandlerManifest::new("X").with_intent("i", "", None).validate().is_err());
    }
}
