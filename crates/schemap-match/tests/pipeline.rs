use schemap_match::{
    ArbitrationError, ArbitrationRequest, ArbitrationVerdict, ExportFormat, MatchInputs,
    MatchPipeline, TableAggregator, parse_column_records, read_column_records, write_report,
};
use schemap_model::{
    ColumnRef, EnsembleConfig, MatchSource, MethodMatch, MethodName, MethodResults,
    SchemaDocument,
};

fn method(name: &str, matches: Vec<MethodMatch>) -> MethodResults {
    MethodResults {
        method: MethodName::new(name).unwrap(),
        matches,
    }
}

fn schema(json: &str) -> SchemaDocument {
    serde_json::from_str(json).unwrap()
}

fn source_schema() -> SchemaDocument {
    schema(
        r#"{
            "tables": [
                {"table_name": "emp", "columns": [
                    {"column_name": "dept_fk", "data_type": "integer"},
                    {"column_name": "full_name", "data_type": "text"},
                    {"column_name": "notes", "data_type": "text"}
                ]}
            ]
        }"#,
    )
}

fn method_results() -> Vec<MethodResults> {
    vec![
        method(
            "bm25",
            vec![
                MethodMatch::top1("emp.dept_fk", "dept.id", 0.40),
                MethodMatch::top1("emp.full_name", "staff.name", 0.30),
            ],
        ),
        method(
            "minilm",
            vec![
                MethodMatch::top_k("emp.dept_fk", [("dept.id", 0.81), ("dept.code", 0.90)]),
                MethodMatch::top_k("emp.full_name", [("staff.name", 0.7), ("dept.name", 0.6)]),
            ],
        ),
        method(
            "mpnet",
            vec![
                MethodMatch::top_k("emp.dept_fk", [("dept.id", 0.77), ("dept.code", 0.50)]),
                MethodMatch::top_k("emp.full_name", [("staff.name", 0.8)]),
            ],
        ),
    ]
}

fn inputs() -> MatchInputs {
    MatchInputs::new(method_results()).with_source_columns(source_schema().columns())
}

#[test]
fn ensemble_scores_the_department_key() {
    let report = MatchPipeline::new(EnsembleConfig::default())
        .unwrap()
        .run(&inputs());

    let dept_fk = report
        .column_matches
        .iter()
        .find(|m| m.source.as_str() == "emp.dept_fk")
        .unwrap();
    assert_eq!(dept_fk.best_match, Some(ColumnRef::new("dept.id").unwrap()));
    assert_eq!(dept_fk.confidence, 0.965);
    assert_eq!(dept_fk.match_source, MatchSource::Ensemble);
    assert_eq!(dept_fk.candidates[0].final_score, 0.965);

    let notes = report
        .column_matches
        .iter()
        .find(|m| m.source.as_str() == "emp.notes")
        .unwrap();
    assert_eq!(notes.best_match, None);
    assert_eq!(notes.confidence, 0.0);
    assert_eq!(notes.match_source, MatchSource::Unmatched);
}

#[test]
fn tables_are_rolled_up_from_columns() {
    let report = MatchPipeline::new(EnsembleConfig::default())
        .unwrap()
        .run(&inputs());
    assert_eq!(report.table_match_count, 1);
    let emp = &report.table_matches[0];
    assert_eq!(emp.source_table, "emp");
    assert_eq!(emp.column_match_count, 3);
    // One vote each for dept and staff; the tie goes to the smaller name.
    assert_eq!(emp.best_match_table.as_deref(), Some("dept"));

    let confidences: f64 = report.column_matches.iter().map(|m| m.confidence).sum();
    assert_eq!(emp.confidence, schemap_model::round_score(confidences / 3.0));
}

#[test]
fn pipeline_is_idempotent() {
    let pipeline = MatchPipeline::new(EnsembleConfig::default()).unwrap();
    let first = serde_json::to_string(&pipeline.run(&inputs())).unwrap();
    let second = serde_json::to_string(&pipeline.run(&inputs())).unwrap();
    assert_eq!(first, second);
}

#[test]
fn invalid_arbiter_answer_falls_back_per_column() {
    let arbiter = |request: &ArbitrationRequest| -> Result<ArbitrationVerdict, ArbitrationError> {
        if request.source.as_str() == "emp.dept_fk" {
            Ok(ArbitrationVerdict {
                best_match: Some("payroll.dept".to_string()),
                confidence: Some(0.99),
            })
        } else {
            Err(ArbitrationError::Unparsable("not json".to_string()))
        }
    };
    let mut config = EnsembleConfig::default();
    config.arbitration.enabled = true;
    let report = MatchPipeline::new(config)
        .unwrap()
        .with_arbiter(&arbiter)
        .run(&inputs());

    let by_source = |id: &str| {
        report
            .column_matches
            .iter()
            .find(|m| m.source.as_str() == id)
            .unwrap()
    };
    let dept_fk = by_source("emp.dept_fk");
    assert_eq!(dept_fk.match_source, MatchSource::FallbackInvalidLlm);
    assert_eq!(dept_fk.best_match, Some(ColumnRef::new("dept.id").unwrap()));
    assert_eq!(dept_fk.confidence, 0.965);
    assert_eq!(
        by_source("emp.full_name").match_source,
        MatchSource::FallbackLlmError
    );
    assert_eq!(by_source("emp.notes").match_source, MatchSource::Unmatched);
}

#[test]
fn panicking_arbiter_does_not_abort_the_run() {
    let arbiter = |request: &ArbitrationRequest| -> Result<ArbitrationVerdict, ArbitrationError> {
        if request.source.as_str() == "emp.dept_fk" {
            panic!("arbiter crashed on {}", request.source);
        }
        Ok(ArbitrationVerdict {
            best_match: Some(request.candidates[0].candidate.to_string()),
            confidence: None,
        })
    };
    let mut config = EnsembleConfig::default();
    config.arbitration.enabled = true;
    let report = MatchPipeline::new(config)
        .unwrap()
        .with_arbiter(&arbiter)
        .run(&inputs());

    assert_eq!(report.column_match_count, 3);
    let source_of = |id: &str| {
        report
            .column_matches
            .iter()
            .find(|m| m.source.as_str() == id)
            .map(|m| m.match_source)
    };
    assert_eq!(source_of("emp.dept_fk"), Some(MatchSource::FallbackLlmError));
    assert_eq!(source_of("emp.full_name"), Some(MatchSource::EnsembleLlm));
}

#[test]
fn exported_report_reaggregates_to_the_same_tables() {
    let report = MatchPipeline::new(EnsembleConfig::default())
        .unwrap()
        .run(&inputs());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    write_report(&report, &path, ExportFormat::Json).unwrap();

    let records = read_column_records(&path).unwrap();
    let tables = TableAggregator::default().aggregate(&records);
    assert_eq!(tables, report.table_matches);
}

#[test]
fn records_with_malformed_ids_are_skipped_when_reaggregating() {
    let records = parse_column_records(
        r#"{"matches": [
            {"source": "employees.id", "best_match": "emp_master.emp_id", "confidence": 0.9},
            {"source": "employees.name", "best_match": "emp_master.full_name", "confidence": 0.8},
            {"source": "employees.dept", "best_match": "staff.dept_code", "confidence": 0.3},
            {"source": "broken", "best_match": "staff.x", "confidence": 1.0}
        ]}"#,
    )
    .unwrap();
    let tables = TableAggregator::default().aggregate(&records);
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].best_match_table.as_deref(), Some("emp_master"));
    assert_eq!(tables[0].confidence, 0.6667);
    assert_eq!(tables[0].column_match_count, 3);
}
