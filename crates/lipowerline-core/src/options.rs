// crates/lipowerline-core/src/options.rs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ImportError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioType {
    #[default]
    PreManejo,
    PosManejo,
    Simulado,
}

impl ScenarioType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioType::PreManejo => "pre_manejo",
            ScenarioType::PosManejo => "pos_manejo",
            ScenarioType::Simulado => "simulado",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim() {
            "pre_manejo" => Ok(ScenarioType::PreManejo),
            "pos_manejo" => Ok(ScenarioType::PosManejo),
            "simulado" => Ok(ScenarioType::Simulado),
            other => Err(ImportError::Validation(format!(
                "unknown scenario type '{}' (expected pre_manejo, pos_manejo or simulado)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    #[default]
    Ativo,
    Arquivado,
}

impl ScenarioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioStatus::Ativo => "ativo",
            ScenarioStatus::Arquivado => "arquivado",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim() {
            "ativo" => Ok(ScenarioStatus::Ativo),
            "arquivado" => Ok(ScenarioStatus::Arquivado),
            other => Err(ImportError::Validation(format!(
                "unknown scenario status '{}' (expected ativo or arquivado)",
                other
            ))),
        }
    }
}

/// Caller-supplied settings for one normalization run.
///
/// Field names on the wire (and in TOML option files) follow the import
/// endpoint: `lineCode`, `tensaoKV`, `scenarioDescription`, ...
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    #[serde(default)]
    pub line_code: String,
    #[serde(default)]
    pub line_name: Option<String>,
    #[serde(default, rename = "tensaoKV")]
    pub voltage_kv: Option<f64>,
    #[serde(default, rename = "concessionaria")]
    pub operator: Option<String>,
    #[serde(default, rename = "regiao")]
    pub region: Option<String>,
    #[serde(default)]
    pub scenario_description: String,
    #[serde(default)]
    pub scenario_date: Option<NaiveDate>,
    #[serde(default)]
    pub scenario_type: ScenarioType,
    #[serde(default)]
    pub scenario_status: ScenarioStatus,
}

impl ImportOptions {
    pub fn new(line_code: impl Into<String>, scenario_description: impl Into<String>) -> Self {
        Self {
            line_code: line_code.into(),
            scenario_description: scenario_description.into(),
            ..Self::default()
        }
    }

    /// Parse options from a TOML document using the wire field names.
    ///
    /// Every field may be left out so a file can hold shared defaults and
    /// leave the line and scenario to command-line flags; [`Self::validate`]
    /// catches whatever is still missing.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str::<ImportOptions>(toml_str)?)
    }

    /// Reject options the database constraints would refuse anyway.
    pub fn validate(&self) -> Result<()> {
        if self.line_code.trim().is_empty() {
            return Err(ImportError::Validation("lineCode cannot be empty".into()));
        }
        if self.scenario_description.trim().is_empty() {
            return Err(ImportError::Validation(
                "scenarioDescription cannot be empty".into(),
            ));
        }
        if let Some(kv) = self.voltage_kv {
            if !kv.is_finite() || kv < 0.0 {
                return Err(ImportError::Validation(format!(
                    "tensaoKV must be a non-negative number, got {}",
                    kv
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_options_use_wire_names_and_defaults() {
        let options = ImportOptions::from_toml(
            r#"
lineCode = "LT-500-01"
tensaoKV = 500.0
concessionaria = "Transmissora Sul"
scenarioDescription = "Campanha 2024"
scenarioDate = "2024-03-15"
"#,
        )
        .expect("parse options");

        assert_eq!(options.line_code, "LT-500-01");
        assert_eq!(options.voltage_kv, Some(500.0));
        assert_eq!(options.operator.as_deref(), Some("Transmissora Sul"));
        assert_eq!(options.region, None);
        assert_eq!(
            options.scenario_date,
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(options.scenario_type, ScenarioType::PreManejo);
        assert_eq!(options.scenario_status, ScenarioStatus::Ativo);
    }

    #[test]
    fn toml_options_accept_explicit_scenario_enums() {
        let options = ImportOptions::from_toml(
            r#"
lineCode = "LT-01"
scenarioDescription = "Pos poda"
scenarioType = "pos_manejo"
scenarioStatus = "arquivado"
"#,
        )
        .expect("parse options");
        assert_eq!(options.scenario_type, ScenarioType::PosManejo);
        assert_eq!(options.scenario_status, ScenarioStatus::Arquivado);
    }

    #[test]
    fn partial_toml_options_parse_and_fail_validation_until_completed() {
        let mut options = ImportOptions::from_toml("tensaoKV = 500.0\nregiao = \"Sul\"\n")
            .expect("partial options parse");
        assert_eq!(options.voltage_kv, Some(500.0));
        assert_eq!(options.region.as_deref(), Some("Sul"));
        assert!(options.line_code.is_empty());
        assert!(options.validate().is_err());

        options.line_code = "LT-1".into();
        options.scenario_description = "X".into();
        assert!(options.validate().is_ok());
    }

    #[test]
    fn malformed_option_files_report_a_parse_error() {
        let err = ImportOptions::from_toml("tensaoKV = \"alta\"").unwrap_err();
        assert!(matches!(err, ImportError::OptionsFile(_)));
        assert!(err.to_string().starts_with("Import options file could not be parsed"));
    }

    #[test]
    fn validate_rejects_blank_required_fields() {
        assert!(ImportOptions::new("  ", "Campanha").validate().is_err());
        assert!(ImportOptions::new("LT-01", "").validate().is_err());
        assert!(ImportOptions::new("LT-01", "Campanha").validate().is_ok());
    }

    #[test]
    fn scenario_enums_round_trip_their_labels() {
        for ty in [ScenarioType::PreManejo, ScenarioType::PosManejo, ScenarioType::Simulado] {
            assert_eq!(ScenarioType::parse(ty.as_str()).unwrap(), ty);
        }
        assert!(ScenarioStatus::parse("apagado").is_err());
    }
}
