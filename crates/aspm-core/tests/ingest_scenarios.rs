//! End-to-end ingestion scenarios against an on-disk store.
//!
//! Each test drives [`Ingestor`] the way the daemon does and checks the
//! resulting provenance graph and vulnerability ledger rows.

mod common;

use std::thread;

use aspm_core::ingest::{IngestError, Ingestor, ReportStatus};
use aspm_core::model::{ArtefactKind, ProductionMethod};
use aspm_core::sarif::Level;
use aspm_core::store::ledger::extract_findings;
use aspm_core::store::{Store, StoreError, StoreOptions};
use common::{
    ci_environment, collect, descriptor, gosec_report, govulncheck_report, origin, result,
    temp_store,
};

#[test]
fn test_identical_findings_collapse_to_one_vulnerability() {
    let (store, _dir) = temp_store();
    let ingestor = Ingestor::new(store.clone());
    let report = gosec_report(&[
        result("G101", "cmd/main.go", 12, 5),
        result("G101", "cmd/main.go", 12, 5),
    ]);

    let outcome = ingestor
        .collect(&collect("A1", &[("gosec.sarif", report)]))
        .unwrap();

    assert_eq!(outcome.product_id, "A1");
    assert!(outcome.product_created);
    match &outcome.reports[0].status {
        ReportStatus::Ingested { summary, .. } => {
            assert_eq!(summary.inserted, 1);
            assert_eq!(summary.duplicates, 1);
        },
        other => panic!("unexpected status: {other:?}"),
    }

    let vulns = store.vulnerabilities().unwrap();
    assert_eq!(vulns.len(), 1);
    assert_eq!(vulns[0].product_id, "A1");
    assert_eq!(vulns[0].location_fingerprint, "cmd/main.go(12:5)");
    assert_eq!(vulns[0].level, Level::Warning);
    assert_eq!(vulns[0].cwe.as_deref(), Some("CWE-798"));

    let product = store.product("A1").unwrap().unwrap();
    assert_eq!(product.kind, Some(ArtefactKind::Binary));
    assert_eq!(store.engagements().unwrap()[0].tool, "gosec");
}

#[test]
fn test_nonstandard_result_fields_keep_the_report() {
    let (store, _dir) = temp_store();
    let ingestor = Ingestor::new(store.clone());

    let mut shouting = result("G101", "cmd/main.go", 30, 1);
    shouting["level"] = "Warning".into();
    let mut unknown_line = result("G101", "cmd/util.go", -1, 4);
    unknown_line["level"] = "severe".into();
    let report = gosec_report(&[result("G101", "cmd/main.go", 12, 5), shouting, unknown_line]);

    let outcome = ingestor
        .collect(&collect("A1", &[("gosec.sarif", report)]))
        .unwrap();

    match &outcome.reports[0].status {
        ReportStatus::Ingested { summary, .. } => assert_eq!(summary.inserted, 3),
        other => panic!("unexpected status: {other:?}"),
    }
    assert_eq!(store.engagements().unwrap()[0].tool, "gosec");

    let vulns = store.vulnerabilities().unwrap();
    let fingerprints: Vec<&str> = vulns.iter().map(|v| v.location_fingerprint.as_str()).collect();
    assert_eq!(fingerprints, ["cmd/main.go(12:5)", "cmd/main.go(30:1)", "cmd/util.go"]);
    assert!(vulns.iter().all(|v| v.level == Level::Warning));
}

#[test]
fn test_govulncheck_findings_carry_cve() {
    let (store, _dir) = temp_store();
    let ingestor = Ingestor::new(store.clone());
    let report = govulncheck_report(&[result("GO-2023-1987", "go.mod", 1, 1)]);

    ingestor
        .collect(&collect("A2", &[("govulncheck.sarif", report)]))
        .unwrap();

    let vulns = store.vulnerabilities().unwrap();
    assert_eq!(vulns.len(), 1);
    assert_eq!(vulns[0].cve.as_deref(), Some("CVE-2023-39319"));
    assert_eq!(vulns[0].cwe, None);
}

#[test]
fn test_resubmitted_report_is_a_new_engagement() {
    let (store, _dir) = temp_store();
    let ingestor = Ingestor::new(store.clone());
    let report = gosec_report(&[result("G101", "a.go", 1, 1)]);
    let request = collect("A1", &[("gosec.sarif", report)]);

    ingestor.collect(&request).unwrap();
    let second = ingestor.collect(&request).unwrap();

    assert!(!second.product_created);
    assert_eq!(store.products().unwrap().len(), 1);
    assert_eq!(store.engagements().unwrap().len(), 2);
    assert_eq!(store.vulnerabilities().unwrap().len(), 2);
}

#[test]
fn test_replaying_stored_engagement_adds_nothing() {
    let (store, _dir) = temp_store();
    let ingestor = Ingestor::new(store.clone());
    let report = gosec_report(&[
        result("G101", "a.go", 1, 1),
        result("G101", "a.go", 1, 1),
        result("G101", "b.go", 7, 3),
    ]);
    ingestor
        .collect(&collect("A1", &[("gosec.sarif", report)]))
        .unwrap();

    let engagement = store.engagements().unwrap().remove(0);
    let summary = store
        .write(|tx| extract_findings(tx, &engagement, None))
        .unwrap();

    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.duplicates, 3);
    assert_eq!(store.vulnerabilities().unwrap().len(), 2);
}

#[test]
fn test_environment_fills_only_empty_fields() {
    let (store, _dir) = temp_store();
    let ingestor = Ingestor::new(store.clone());

    let mut request = collect("A1", &[]);
    request.environment = ci_environment();
    request.artefact.author = "alice".to_string();
    ingestor.collect(&request).unwrap();

    let product = store.product("A1").unwrap().unwrap();
    assert_eq!(product.author, "alice");
    assert_eq!(product.project, "group/app");
    assert_eq!(product.worker, "runner-3");

    // Later submissions never overwrite populated fields.
    let mut later = collect("A1", &[]);
    later.environment.insert("CI_PROJECT_PATH".to_string(), "other/app".to_string());
    later.artefact.name = "server".to_string();
    ingestor.collect(&later).unwrap();

    let product = store.product("A1").unwrap().unwrap();
    assert_eq!(product.project, "group/app");
    assert_eq!(product.name, "server");
}

#[test]
fn test_failing_report_does_not_block_the_next() {
    let (store, _dir) = temp_store();
    store
        .write(|tx| -> Result<(), StoreError> {
            tx.execute_batch(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON engagements
                 WHEN NEW.report_name = 'a_poison.sarif'
                 BEGIN SELECT RAISE(ABORT, 'poisoned report'); END;",
            )?;
            Ok(())
        })
        .unwrap();

    let ingestor = Ingestor::new(store.clone());
    let report = gosec_report(&[result("G101", "a.go", 1, 1)]);
    let outcome = ingestor
        .collect(&collect(
            "A1",
            &[
                ("b_gosec.sarif", report.clone()),
                ("a_poison.sarif", report),
            ],
        ))
        .unwrap();

    assert!(outcome.has_failures());
    assert_eq!(outcome.reports[0].report_name, "a_poison.sarif");
    assert!(matches!(
        outcome.reports[0].status,
        ReportStatus::Failed { .. }
    ));
    assert!(matches!(
        outcome.reports[1].status,
        ReportStatus::Ingested { .. }
    ));
    assert!(outcome.product_created);

    let engagements = store.engagements().unwrap();
    assert_eq!(engagements.len(), 1);
    assert_eq!(engagements[0].report_name, "b_gosec.sarif");
    assert_eq!(store.vulnerabilities().unwrap().len(), 1);
}

#[test]
fn test_mixed_valid_and_undecodable_reports() {
    let (store, _dir) = temp_store();
    let ingestor = Ingestor::new(store.clone());
    let outcome = ingestor
        .collect(&collect(
            "A1",
            &[
                ("gosec.sarif", gosec_report(&[result("G101", "a.go", 1, 1)])),
                ("notes.txt", "plain text".to_string()),
            ],
        ))
        .unwrap();

    assert!(!outcome.has_failures());
    let tools: Vec<_> = store
        .engagements()
        .unwrap()
        .into_iter()
        .map(|e| e.tool)
        .collect();
    assert_eq!(tools, vec!["gosec", "unknown"]);
    assert_eq!(store.vulnerabilities().unwrap().len(), 1);
}

#[test]
fn test_origin_links_are_idempotent() {
    let (store, _dir) = temp_store();
    let ingestor = Ingestor::new(store.clone());
    let request = origin("P1", &["O1", "O2"], ProductionMethod::Pack);

    let first = ingestor.origin(&request).unwrap();
    assert_eq!(first.created_links, 2);
    assert!(first.links.iter().all(|l| l.method == ProductionMethod::Pack));
    assert!(first.links.iter().all(|l| l.product_id == "P1"));

    let second = ingestor.origin(&request).unwrap();
    assert_eq!(second.created_links, 0);
    assert_eq!(second.links, first.links);

    assert_eq!(store.links().unwrap().len(), 2);
    assert_eq!(store.products().unwrap().len(), 3);
}

#[test]
fn test_origin_with_another_method_adds_links() {
    let (store, _dir) = temp_store();
    let ingestor = Ingestor::new(store.clone());

    ingestor
        .origin(&origin("P1", &["O1"], ProductionMethod::Compile))
        .unwrap();
    let outcome = ingestor
        .origin(&origin("P1", &["O1"], ProductionMethod::Pack))
        .unwrap();

    assert_eq!(outcome.created_links, 1);
    assert_eq!(store.links().unwrap().len(), 2);
}

#[test]
fn test_origins_do_not_inherit_environment() {
    let (store, _dir) = temp_store();
    let ingestor = Ingestor::new(store.clone());
    let mut request = origin("P1", &["O1"], ProductionMethod::Compile);
    request.environment = ci_environment();
    request.origins[0].name = "libfoo".to_string();

    ingestor.origin(&request).unwrap();

    let target = store.product("P1").unwrap().unwrap();
    assert_eq!(target.project, "group/app");
    let origin = store.product("O1").unwrap().unwrap();
    assert_eq!(origin.name, "libfoo");
    assert_eq!(origin.project, "");
    assert_eq!(origin.worker, "");
}

#[test]
fn test_origin_failure_rolls_back_everything() {
    let (store, _dir) = temp_store();
    store
        .write(|tx| -> Result<(), StoreError> {
            tx.execute_batch(
                "CREATE TRIGGER reject_o2 BEFORE INSERT ON links
                 WHEN NEW.origin_id = 'O2'
                 BEGIN SELECT RAISE(ABORT, 'rejected origin'); END;",
            )?;
            Ok(())
        })
        .unwrap();

    let ingestor = Ingestor::new(store.clone());
    let err = ingestor
        .origin(&origin("P1", &["O1", "O2"], ProductionMethod::Pack))
        .unwrap_err();

    assert!(matches!(err, IngestError::Store(_)));
    assert!(store.products().unwrap().is_empty());
    assert!(store.links().unwrap().is_empty());
}

#[test]
fn test_empty_ids_are_rejected() {
    let (store, _dir) = temp_store();
    let ingestor = Ingestor::new(store.clone());

    let err = ingestor.collect(&collect("", &[])).unwrap_err();
    assert!(err.is_submission_error());

    let mut request = origin("P1", &["O1"], ProductionMethod::Compile);
    request.origins.push(descriptor(""));
    let err = ingestor.origin(&request).unwrap_err();
    assert!(err.is_submission_error());

    assert!(store.products().unwrap().is_empty());
}

#[test]
fn test_concurrent_submissions_converge() {
    let (store, dir) = temp_store();
    let path = dir.path().join("aspm.db");
    let report = gosec_report(&[result("G101", "a.go", 1, 1)]);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            let report = report.clone();
            thread::spawn(move || {
                let store = Store::open(&path, StoreOptions::default()).unwrap();
                let ingestor = Ingestor::new(store);
                for _ in 0..5 {
                    let outcome = ingestor
                        .collect(&collect("A1", &[("gosec.sarif", report.clone())]))
                        .unwrap();
                    assert!(!outcome.has_failures());
                    ingestor
                        .origin(&origin("A1", &["S1", "S2"], ProductionMethod::Compile))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.products().unwrap().len(), 3);
    assert_eq!(store.links().unwrap().len(), 2);
    assert_eq!(store.engagements().unwrap().len(), 20);
    assert_eq!(store.vulnerabilities().unwrap().len(), 20);
}
