//! Orchestrator integration tests with in-memory collaborators.
//!
//! Pages come from a fixed in-memory source and replies from a scripted
//! remote, so no pdfium library or API key is needed. A gated remote holds an
//! attempt in flight to exercise the busy flags.

use edgequake_billrecon::{
    compile, AnomalyChecker, BillDraft, BillReconError, Document, ExtractionOrchestrator,
    ExtractionOutcome, ExtractionProgressCallback, LedgerOp, MarkdownReportRenderer, Operation,
    PageImage, PageImageSource, PatientField, ProgressCallback, RemoteModel, ReportConfig, ReportRenderer, Session,
};
use edgequake_billrecon::schema::{AnomalyRequest, ExtractionRequest, BILLS_KEY};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

const TINY_PDF: &[u8] = b"%PDF-1.4\n%%EOF\n";

const SCENARIO: &str = r#"{"bills":[{"billerName":"City Clinic","billNumber":"B-1","billDate":"01-01-2024","billAmount":"150.5"}],"patientDetails":{"name":"A"},"policyHolderDetails":{"name":"B","policyNumber":"P1"}}"#;

const TWO_BILLS: &str = r#"```json
{"bills":[
  {"billerName":"City Clinic","billNumber":"B-1","billDate":"01-01-2024","billAmount":100},
  {"billerName":"Apollo Pharmacy","billNumber":"RX-9","billDate":"02-01-2024","billAmount":"250.25"}
],
"patientDetails":{"name":"Asha Rao","gender":"F"},
"policyHolderDetails":{"name":"Ravi Rao","policyNumber":"POL-77"}}
```"#;

// ── Test doubles ─────────────────────────────────────────────────────────────

fn document(name: &str) -> Document {
    Document::from_bytes(name, TINY_PDF).unwrap()
}

/// Hands out `pages` one-byte images, reporting progress after each.
struct StaticPages {
    pages: usize,
}

impl PageImageSource for StaticPages {
    async fn rasterize(
        &self,
        document: &Document,
        on_progress: &(dyn Fn(f32) + Send + Sync),
    ) -> Result<Vec<PageImage>, BillReconError> {
        if self.pages == 0 {
            return Err(BillReconError::EmptyDocument {
                path: document.path().to_path_buf(),
            });
        }
        let mut out = Vec::with_capacity(self.pages);
        for i in 1..=self.pages {
            out.push(PageImage::png(i, vec![i as u8]));
            on_progress(i as f32 / self.pages as f32);
        }
        Ok(out)
    }
}

#[derive(Clone)]
enum Reply {
    Json(&'static str),
    Nothing,
    Fail,
}

#[derive(Default)]
struct Seen {
    instructions: Vec<String>,
    page_nums: Vec<Vec<usize>>,
    schema_has_bills: Vec<bool>,
}

/// Answers every call with a fixed reply and records what it was sent.
struct ScriptedRemote {
    reply: Mutex<Reply>,
    advisory: String,
    seen: Arc<Mutex<Seen>>,
}

impl ScriptedRemote {
    fn new(reply: Reply) -> Self {
        Self {
            reply: Mutex::new(reply),
            advisory: "Bill B-1 appears twice.".to_string(),
            seen: Arc::new(Mutex::new(Seen::default())),
        }
    }

    fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }
}

impl RemoteModel for ScriptedRemote {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Option<String>, BillReconError> {
        {
            let mut seen = self.seen.lock().unwrap();
            seen.instructions.push(request.instruction.clone());
            seen.page_nums
                .push(request.images.iter().map(|p| p.page_num).collect());
            seen.schema_has_bills
                .push(request.schema["properties"].get(BILLS_KEY).is_some());
        }
        let reply = self.reply.lock().unwrap().clone();
        match reply {
            Reply::Json(text) => Ok(Some(text.to_string())),
            Reply::Nothing => Ok(None),
            Reply::Fail => Err(BillReconError::ServiceFailure {
                message: "HTTP 503".into(),
            }),
        }
    }

    async fn advise(&self, request: &AnomalyRequest) -> Result<String, BillReconError> {
        self.seen
            .lock()
            .unwrap()
            .instructions
            .push(request.instruction.clone());
        Ok(self.advisory.clone())
    }
}

/// Blocks `extract` until released, so an attempt stays in flight.
#[derive(Default)]
struct Gate {
    entered: Notify,
    release: Notify,
}

struct GatedRemote {
    gate: Arc<Gate>,
}

impl RemoteModel for GatedRemote {
    async fn extract(&self, _request: &ExtractionRequest) -> Result<Option<String>, BillReconError> {
        self.gate.entered.notify_one();
        self.gate.release.notified().await;
        Ok(Some(SCENARIO.to_string()))
    }

    async fn advise(&self, _request: &AnomalyRequest) -> Result<String, BillReconError> {
        self.gate.entered.notify_one();
        self.gate.release.notified().await;
        Ok("no anomalies".to_string())
    }
}

#[derive(Default)]
struct Recorder {
    progress: Mutex<Vec<f32>>,
    rendered: Mutex<Option<usize>>,
    completed: Mutex<Option<usize>>,
    failed: Mutex<Option<String>>,
}

impl ExtractionProgressCallback for Recorder {
    fn on_pages_rendered(&self, page_count: usize) {
        *self.rendered.lock().unwrap() = Some(page_count);
    }

    fn on_progress(&self, percent: f32) {
        self.progress.lock().unwrap().push(percent);
    }

    fn on_extraction_complete(&self, bill_count: usize) {
        *self.completed.lock().unwrap() = Some(bill_count);
    }

    fn on_extraction_failed(&self, message: &str) {
        *self.failed.lock().unwrap() = Some(message.to_string());
    }
}

// ── Extraction outcomes ──────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_response_populates_session() {
    let orchestrator = ExtractionOrchestrator::new(StaticPages { pages: 1 }, ScriptedRemote::new(Reply::Json(SCENARIO)));
    let doc = document("claim.pdf");
    let mut session = Session::new();

    let outcome = orchestrator.run(&mut session, &doc).await.unwrap();

    let populated = match outcome {
        ExtractionOutcome::Populated(p) => p,
        other => panic!("expected Populated, got {other:?}"),
    };
    assert_eq!(populated.bills.len(), 1);
    assert_eq!(populated.bills[0].bill_amount, 150.5);

    assert_eq!(session.ledger().len(), 1);
    assert_eq!(session.ledger().items()[0].id, populated.bills[0].id);
    assert_eq!(session.patient().name, "A");
    assert_eq!(session.patient().gender, "");
    assert_eq!(session.policy_holder().name, "B");
    assert_eq!(session.policy_holder().policy_number, "P1");
    assert_eq!(session.policy_holder().email, "");
    assert_eq!(session.document().unwrap().id, doc.id());
}

#[tokio::test]
async fn fenced_reply_keeps_document_order() {
    let remote = ScriptedRemote::new(Reply::Json(TWO_BILLS));
    let seen = Arc::clone(&remote.seen);
    let orchestrator = ExtractionOrchestrator::new(StaticPages { pages: 3 }, remote);
    let mut session = Session::new();

    let outcome = orchestrator.run(&mut session, &document("claim.pdf")).await.unwrap();
    assert!(outcome.is_populated());

    let names: Vec<&str> = session.ledger().iter().map(|b| b.biller_name.as_str()).collect();
    assert_eq!(names, ["City Clinic", "Apollo Pharmacy"]);
    assert!((session.ledger().total() - 350.25).abs() < 1e-9);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.page_nums, vec![vec![1, 2, 3]]);
    assert_eq!(seen.schema_has_bills, vec![true]);
}

#[tokio::test]
async fn empty_reply_is_empty_extraction() {
    let orchestrator = ExtractionOrchestrator::new(StaticPages { pages: 2 }, ScriptedRemote::new(Reply::Nothing));
    let mut session = Session::new();

    let outcome = orchestrator.run(&mut session, &document("blank.pdf")).await.unwrap();

    assert!(matches!(outcome, ExtractionOutcome::Empty));
    assert_eq!(outcome.user_message(), Some("no bills found, try another document"));
    assert!(session.ledger().is_empty());
    assert!(session.patient().is_blank());
    assert!(session.policy_holder().is_blank());
}

#[tokio::test]
async fn malformed_reply_is_recovered_as_empty() {
    let orchestrator = ExtractionOrchestrator::new(
        StaticPages { pages: 1 },
        ScriptedRemote::new(Reply::Json("I could not read this document, sorry.")),
    );
    let mut session = Session::new();

    let outcome = orchestrator.run(&mut session, &document("x.pdf")).await.unwrap();
    assert!(matches!(outcome, ExtractionOutcome::Empty));
    assert!(session.ledger().is_empty());
}

#[tokio::test]
async fn service_failure_is_failed_and_transient() {
    let orchestrator = ExtractionOrchestrator::new(StaticPages { pages: 1 }, ScriptedRemote::new(Reply::Fail));
    let mut session = Session::new();

    let outcome = orchestrator.run(&mut session, &document("x.pdf")).await.unwrap();

    match outcome {
        ExtractionOutcome::Failed(failure) => {
            assert_eq!(failure.message, "document processing error");
            assert!(failure.is_transient());
            assert!(matches!(failure.cause, BillReconError::ServiceFailure { .. }));
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    assert!(session.ledger().is_empty());
}

#[tokio::test]
async fn rasterisation_failure_is_failed_not_transient() {
    let orchestrator = ExtractionOrchestrator::new(StaticPages { pages: 0 }, ScriptedRemote::new(Reply::Json(SCENARIO)));
    let mut session = Session::new();

    let outcome = orchestrator.run(&mut session, &document("x.pdf")).await.unwrap();

    match outcome {
        ExtractionOutcome::Failed(failure) => assert!(!failure.is_transient()),
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_retry_leaves_no_stale_data() {
    let remote = ScriptedRemote::new(Reply::Json(TWO_BILLS));
    let orchestrator = ExtractionOrchestrator::new(StaticPages { pages: 1 }, remote);
    let mut session = Session::new();

    let first = document("first.pdf");
    orchestrator.run(&mut session, &first).await.unwrap();
    assert_eq!(session.ledger().len(), 2);
    session.patch_patient(PatientField::DateOfBirth, "01-01-1980");

    // Same orchestrator, now failing.
    orchestrator.remote().set_reply(Reply::Fail);
    let second = document("second.pdf");
    let outcome = orchestrator.run(&mut session, &second).await.unwrap();

    assert!(matches!(outcome, ExtractionOutcome::Failed(_)));
    assert!(session.ledger().is_empty());
    assert!(session.patient().is_blank());
    assert!(session.policy_holder().is_blank());
    assert_eq!(session.document().unwrap().id, second.id());
}

#[tokio::test]
async fn custom_instruction_is_sent() {
    let remote = ScriptedRemote::new(Reply::Json(SCENARIO));
    let seen = Arc::clone(&remote.seen);
    let orchestrator = ExtractionOrchestrator::new(StaticPages { pages: 1 }, remote)
        .with_instruction(Some("Only list pharmacy bills.".into()));
    let mut session = Session::new();

    orchestrator.run(&mut session, &document("x.pdf")).await.unwrap();

    assert_eq!(seen.lock().unwrap().instructions, vec!["Only list pharmacy bills."]);
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn progress_is_monotonic_and_mapped() {
    let recorder = Arc::new(Recorder::default());
    let orchestrator = ExtractionOrchestrator::new(StaticPages { pages: 4 }, ScriptedRemote::new(Reply::Json(TWO_BILLS)))
        .with_progress_callback(Some(recorder.clone() as ProgressCallback));
    let mut session = Session::new();

    orchestrator.run(&mut session, &document("x.pdf")).await.unwrap();

    let progress = recorder.progress.lock().unwrap().clone();
    assert_eq!(progress, vec![18.75, 37.5, 56.25, 75.0, 80.0, 100.0]);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*recorder.rendered.lock().unwrap(), Some(4));
    assert_eq!(*recorder.completed.lock().unwrap(), Some(2));
    assert!(recorder.failed.lock().unwrap().is_none());
}

#[tokio::test]
async fn failed_attempt_reports_failure_without_completion() {
    let recorder = Arc::new(Recorder::default());
    let orchestrator = ExtractionOrchestrator::new(StaticPages { pages: 2 }, ScriptedRemote::new(Reply::Fail))
        .with_progress_callback(Some(recorder.clone() as ProgressCallback));
    let mut session = Session::new();

    orchestrator.run(&mut session, &document("x.pdf")).await.unwrap();

    let progress = recorder.progress.lock().unwrap().clone();
    assert_eq!(progress.last(), Some(&80.0));
    assert_eq!(
        recorder.failed.lock().unwrap().as_deref(),
        Some("document processing error")
    );
    assert!(recorder.completed.lock().unwrap().is_none());
}

// ── Busy flags ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn second_extraction_is_rejected_while_first_in_flight() {
    let gate = Arc::new(Gate::default());
    let orchestrator = ExtractionOrchestrator::new(
        StaticPages { pages: 1 },
        GatedRemote {
            gate: Arc::clone(&gate),
        },
    );

    let first_doc = document("first.pdf");
    let second_doc = document("second.pdf");
    let mut first_session = Session::new();
    let mut second_session = Session::new();
    second_session
        .ledger_mut()
        .add(BillDraft::new("Earlier", "E-1", "01-01-2024", 5.0))
        .unwrap();

    let first = orchestrator.run(&mut first_session, &first_doc);
    let second = async {
        gate.entered.notified().await;
        assert!(orchestrator.is_busy());
        let result = orchestrator.run(&mut second_session, &second_doc).await;
        gate.release.notify_one();
        result
    };
    let (first, second) = futures::future::join(first, second).await;

    assert!(first.unwrap().is_populated());
    assert!(matches!(
        second,
        Err(BillReconError::Busy {
            operation: Operation::Extraction
        })
    ));
    // A rejected attempt does not reset its session.
    assert_eq!(second_session.ledger().len(), 1);
    assert!(second_session.document().is_none());
    assert!(!orchestrator.is_busy());

    // Once settled, a new attempt is accepted.
    gate.release.notify_one();
    let again = orchestrator.run(&mut second_session, &second_doc).await.unwrap();
    assert!(again.is_populated());
    assert_eq!(second_session.ledger().len(), 1);
    assert_eq!(second_session.ledger().items()[0].biller_name, "City Clinic");
}

#[tokio::test]
async fn anomaly_check_runs_independently_of_extraction() {
    let gate = Arc::new(Gate::default());
    let orchestrator = ExtractionOrchestrator::new(
        StaticPages { pages: 1 },
        GatedRemote {
            gate: Arc::clone(&gate),
        },
    );
    let checker = AnomalyChecker::new(StaticPages { pages: 1 }, ScriptedRemote::new(Reply::Nothing));
    let doc = document("claim.pdf");
    let mut session = Session::new();

    let extraction = orchestrator.run(&mut session, &doc);
    let check = async {
        gate.entered.notified().await;
        let advisory = checker.check(&doc).await;
        gate.release.notify_one();
        advisory
    };
    let (extraction, advisory) = futures::future::join(extraction, check).await;

    assert!(extraction.unwrap().is_populated());
    let advisory = advisory.unwrap();
    assert_eq!(advisory.document_id, doc.id());
    assert!(session.accept_advisory(advisory));
    assert_eq!(session.advisory().unwrap().text, "Bill B-1 appears twice.");
}

#[tokio::test]
async fn second_anomaly_check_is_rejected_while_first_in_flight() {
    let gate = Arc::new(Gate::default());
    let checker = AnomalyChecker::new(
        StaticPages { pages: 2 },
        GatedRemote {
            gate: Arc::clone(&gate),
        },
    );
    let doc = document("claim.pdf");

    let first = checker.check(&doc);
    let second = async {
        gate.entered.notified().await;
        let result = checker.check(&doc).await;
        gate.release.notify_one();
        result
    };
    let (first, second) = futures::future::join(first, second).await;

    assert_eq!(first.unwrap().text, "no anomalies");
    assert!(matches!(
        second,
        Err(BillReconError::Busy {
            operation: Operation::AnomalyCheck
        })
    ));
    assert!(!checker.is_busy());
}

// ── Anomaly advisories ───────────────────────────────────────────────────────

#[tokio::test]
async fn advisory_text_is_verbatim_and_uses_custom_instruction() {
    let remote = ScriptedRemote::new(Reply::Nothing);
    let seen = Arc::clone(&remote.seen);
    let checker = AnomalyChecker::new(StaticPages { pages: 1 }, remote)
        .with_instruction(Some("Look for duplicate bills only.".into()));

    let advisory = checker.check(&document("claim.pdf")).await.unwrap();

    assert_eq!(advisory.text, "Bill B-1 appears twice.");
    assert_eq!(seen.lock().unwrap().instructions, vec!["Look for duplicate bills only."]);
}

#[tokio::test]
async fn advisory_for_previous_upload_is_ignored() {
    let checker = AnomalyChecker::new(StaticPages { pages: 1 }, ScriptedRemote::new(Reply::Nothing));
    let orchestrator = ExtractionOrchestrator::new(StaticPages { pages: 1 }, ScriptedRemote::new(Reply::Json(SCENARIO)));
    let mut session = Session::new();

    let first = document("first.pdf");
    orchestrator.run(&mut session, &first).await.unwrap();
    let advisory = checker.check(&first).await.unwrap();

    // The user uploads another document before the advisory is shown.
    let second = document("second.pdf");
    orchestrator.run(&mut session, &second).await.unwrap();

    assert!(!session.accept_advisory(advisory));
    assert!(session.advisory().is_none());
}

#[tokio::test]
async fn anomaly_check_surfaces_rasterisation_errors() {
    let checker = AnomalyChecker::new(StaticPages { pages: 0 }, ScriptedRemote::new(Reply::Nothing));
    let err = checker.check(&document("claim.pdf")).await.unwrap_err();
    assert!(matches!(err, BillReconError::EmptyDocument { .. }));
    assert!(!checker.is_busy());
}

// ── Reconcile and report ─────────────────────────────────────────────────────

#[tokio::test]
async fn edit_script_then_report() {
    let orchestrator = ExtractionOrchestrator::new(StaticPages { pages: 2 }, ScriptedRemote::new(Reply::Json(TWO_BILLS)));
    let mut session = Session::new();
    orchestrator.run(&mut session, &document("claim.pdf")).await.unwrap();

    let script = r#"[
        {"op": "update", "row": 2, "billerName": "Apollo Pharmacy", "billNumber": "RX-9",
         "billDate": "02-01-2024", "billAmount": "₹ 1,250.00"},
        {"op": "add", "billerName": "Lab", "billNumber": "L-1", "billDate": "03-01-2024", "billAmount": 49.5},
        {"op": "add", "billerName": "", "billNumber": "", "billDate": "03-01-2024", "billAmount": 10},
        {"op": "delete", "row": 1}
    ]"#;
    let ops: Vec<LedgerOp> = serde_json::from_str(script).unwrap();
    let mut rejected = 0;
    for op in ops {
        if session.ledger_mut().apply(op).is_err() {
            rejected += 1;
        }
    }
    assert_eq!(rejected, 1);

    let names: Vec<&str> = session.ledger().iter().map(|b| b.biller_name.as_str()).collect();
    assert_eq!(names, ["Apollo Pharmacy", "Lab"]);
    assert!((session.ledger().total() - 1299.5).abs() < 1e-9);

    let config = ReportConfig::default();
    let layout = compile(&session, &config);
    assert_eq!(layout.header[0].1, "Asha Rao");
    assert_eq!(layout.header[1].1, "POL-77");
    assert_eq!(layout.rows[0][4], "1,250.00");
    assert_eq!(layout.total.amount, "1,299.50");

    let rendered = MarkdownReportRenderer::from_config(&config).render(&layout).unwrap();
    assert_eq!(rendered.page_count, 1);
    assert!(rendered.content.contains("| 2 | Lab | L-1 | 03-01-2024 | 49.50 |"));
    assert!(rendered.content.contains("**1,299.50**"));
}

#[test]
fn orchestrators_work_outside_tokio_test_macro() {
    let orchestrator = ExtractionOrchestrator::new(StaticPages { pages: 1 }, ScriptedRemote::new(Reply::Json(SCENARIO)));
    let mut session = Session::new();
    let doc = document("claim.pdf");

    let outcome = tokio_test::block_on(orchestrator.run(&mut session, &doc)).unwrap();

    assert!(outcome.is_populated());
    assert_eq!(session.ledger().len(), 1);
}
