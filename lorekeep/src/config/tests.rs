#[cfg(test)]
mod tests {
    use crate::config::{
        ConfigBuilder, ConfigError, ConfigLoader, ExtractorConfig, ExtractorKind, GazetteerSettings, LogFormat,
        LogLevel, LorekeepConfig, validation,
    };
    use crate::models::EntityType;
    use crate::resolution::{SimilarityMetric, TieBreak};
    use figment::Jail;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = LorekeepConfig::default();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.extraction.extractors.len(), 2);
        assert_eq!(config.extraction.span_overlap_threshold, 0.5);
        assert_eq!(config.resolution.fuzzy_threshold, 0.85);
        assert_eq!(config.resolution.similarity_metric, SimilarityMetric::EditDistance);
        assert_eq!(
            config.resolution.tie_break,
            vec![TieBreak::HighestConfidence, TieBreak::MostRecent]
        );
        assert_eq!(config.confidence.recency_half_life, Duration::from_secs(30 * 24 * 3600));
        assert_eq!(config.retention.max_observations, 100);
    }

    #[test]
    fn test_validation() {
        assert!(ConfigBuilder::new().build().is_ok());
        assert!(validation::validate_config(&LorekeepConfig::default()).is_ok());

        let err = ConfigBuilder::new().with_fuzzy_threshold(1.5).build().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(msg) if msg.contains("fuzzy_threshold")));

        let duplicate = ConfigBuilder::new()
            .with_extractor(ExtractorConfig::gazetteer("gazetteer", GazetteerSettings::default()))
            .build();
        assert!(duplicate.is_err());

        assert!(ConfigBuilder::new().with_extractors(Vec::new()).build().is_err());
        assert!(ConfigBuilder::new().with_max_observations(0).build().is_err());
        assert!(ConfigBuilder::new().with_default_timeout(Duration::ZERO).build().is_err());
    }

    #[test]
    fn test_predefined_configs() {
        let dev = ConfigBuilder::development().build().unwrap();
        assert_eq!(dev.logging.level, LogLevel::Debug);
        assert_eq!(dev.logging.format, LogFormat::Pretty);

        let test = ConfigBuilder::testing().build().unwrap();
        assert_eq!(test.extraction.default_timeout, Duration::from_secs(1));

        let prod = ConfigBuilder::production().build().unwrap();
        assert_eq!(prod.logging.format, LogFormat::Json);
        assert!(prod.logging.file.is_some_and(|p| p.ends_with("lorekeep.log")));
    }

    #[test]
    fn test_builder_gazetteer_patterns() {
        let config = ConfigBuilder::new()
            .without_model_extractors()
            .with_gazetteer_patterns("Technology", ["Python", "Rust"])
            .with_required_properties(EntityType::Task, ["status"])
            .build()
            .unwrap();

        assert_eq!(config.extraction.extractors.len(), 1);
        match &config.extraction.extractors[0].kind {
            ExtractorKind::Gazetteer(settings) => {
                assert_eq!(settings.patterns["Technology"], vec!["Python", "Rust"]);
            }
            other => panic!("unexpected extractor kind {other:?}"),
        }
        assert_eq!(config.validation.required_properties[&EntityType::Task], vec!["status"]);
    }

    #[test]
    fn test_config_serialization() {
        let config = ConfigBuilder::new()
            .with_extractor(
                ExtractorConfig::gazetteer("tech", GazetteerSettings::default())
                    .with_weight(2.0)
                    .with_timeout(Duration::from_millis(250)),
            )
            .build()
            .unwrap();

        let json = serde_json::to_string(&config).unwrap();
        let deserialized: LorekeepConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_load_toml_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "lorekeep.toml",
                r#"
                [resolution]
                fuzzy_threshold = 0.9
                similarity_metric = "max"
                tie_break = ["most_observed", "highest_confidence"]

                [confidence]
                recency_half_life = "7days"

                [validation.required_properties]
                Task = ["status"]

                [[extraction.extractors]]
                name = "tech-terms"
                type = "gazetteer"
                case_insensitive = true
                weight = 2.0
                timeout = "250ms"

                [extraction.extractors.patterns]
                Technology = ["Python", "Rust"]
                "#,
            )?;

            let config = ConfigLoader::new()
                .load_file("lorekeep.toml")
                .map_err(|e| e.to_string())?
                .extract()
                .map_err(|e| e.to_string())?;

            assert!((config.resolution.fuzzy_threshold - 0.9).abs() < 1e-6);
            assert_eq!(config.resolution.similarity_metric, SimilarityMetric::Max);
            assert_eq!(
                config.resolution.tie_break,
                vec![TieBreak::MostObserved, TieBreak::HighestConfidence]
            );
            assert_eq!(config.confidence.recency_half_life, Duration::from_secs(7 * 24 * 3600));
            assert_eq!(config.validation.required_properties[&EntityType::Task], vec!["status"]);

            assert_eq!(config.extraction.extractors.len(), 1);
            let extractor = &config.extraction.extractors[0];
            assert_eq!(extractor.name, "tech-terms");
            assert_eq!(extractor.weight, 2.0);
            assert_eq!(extractor.timeout, Some(Duration::from_millis(250)));
            match &extractor.kind {
                ExtractorKind::Gazetteer(settings) => {
                    assert!(settings.case_insensitive);
                    assert_eq!(settings.patterns["Technology"], vec!["Python", "Rust"]);
                }
                other => panic!("unexpected extractor kind {other:?}"),
            }
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "lorekeep.yaml",
                "resolution:\n  fuzzy_threshold: 0.7\nlogging:\n  level: warn\n",
            )?;
            jail.set_env("LOREKEEP_RESOLUTION__FUZZY_THRESHOLD", "0.95");
            jail.set_env("LOREKEEP_RETENTION__MAX_OBSERVATIONS", "12");

            let config = ConfigLoader::new()
                .load_default_files()
                .load_env()
                .extract()
                .map_err(|e| e.to_string())?;

            assert!((config.resolution.fuzzy_threshold - 0.95).abs() < 1e-6);
            assert_eq!(config.retention.max_observations, 12);
            assert_eq!(config.logging.level, LogLevel::Warn);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_rejected_on_load() {
        Jail::expect_with(|jail| {
            jail.set_env("LOREKEEP_RESOLUTION__AMBIGUITY_MARGIN", "2.0");
            let result = ConfigLoader::new().load_env().extract();
            assert!(matches!(result, Err(ConfigError::ValidationError(_))));
            Ok(())
        });
    }

    #[test]
    fn test_missing_and_unsupported_files() {
        let mut loader = ConfigLoader::new();
        assert!(matches!(
            loader.load_file("/definitely/not/here.toml"),
            Err(ConfigError::FileLoadError(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(matches!(loader.load_file(&path), Err(ConfigError::FileLoadError(_))));
    }
}
