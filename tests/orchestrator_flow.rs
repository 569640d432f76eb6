use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pdf_splitter_client::clients::{
    DownloadedFile, SplitReceipt, SplitRequest, SplitterApi, UploadReceipt,
};
use pdf_splitter_client::error::{AppError, AppResult, TransportError, WorkflowError};
use pdf_splitter_client::models::{
    Analysis, DownloadId, FileId, Segment, SourceFile, SplitResult,
};
use pdf_splitter_client::{Orchestrator, PhaseKind, StepResult};
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

// ========== 内存中的拆分服务 ==========

struct Scripted<T> {
    gate: Option<Arc<Notify>>,
    result: AppResult<T>,
}

#[derive(Default)]
struct FakeApi {
    uploads: Mutex<VecDeque<Scripted<UploadReceipt>>>,
    splits: Mutex<VecDeque<Scripted<SplitReceipt>>>,
    cleanup_fails: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl FakeApi {
    fn push_upload(&self, result: AppResult<UploadReceipt>) {
        self.uploads
            .lock()
            .unwrap()
            .push_back(Scripted { gate: None, result });
    }

    /// 响应会一直挂起，直到返回的 Notify 被触发
    fn push_gated_upload(&self, result: AppResult<UploadReceipt>) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.uploads.lock().unwrap().push_back(Scripted {
            gate: Some(gate.clone()),
            result,
        });
        gate
    }

    fn push_split(&self, result: AppResult<SplitReceipt>) {
        self.splits
            .lock()
            .unwrap()
            .push_back(Scripted { gate: None, result });
    }

    fn push_gated_split(&self, result: AppResult<SplitReceipt>) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.splits.lock().unwrap().push_back(Scripted {
            gate: Some(gate.clone()),
            result,
        });
        gate
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

async fn next<T>(queue: &Mutex<VecDeque<Scripted<T>>>, endpoint: &str) -> AppResult<T> {
    let scripted = queue.lock().unwrap().pop_front();
    let Some(scripted) = scripted else {
        return Err(AppError::service(endpoint, "no scripted response"));
    };
    if let Some(gate) = scripted.gate {
        gate.notified().await;
    }
    scripted.result
}

#[async_trait]
impl SplitterApi for FakeApi {
    async fn upload(&self, file: &SourceFile) -> AppResult<UploadReceipt> {
        self.record(format!("upload:{}", file.name));
        next(&self.uploads, "/api/upload").await
    }

    async fn split(&self, request: &SplitRequest) -> AppResult<SplitReceipt> {
        self.record(format!("split:{}:{}", request.file_id, request.filename));
        next(&self.splits, "/api/split").await
    }

    async fn download_one(
        &self,
        download_id: &DownloadId,
        output_filename: &str,
    ) -> AppResult<DownloadedFile> {
        self.record(format!("download_one:{}/{}", download_id, output_filename));
        Ok(DownloadedFile {
            suggested_name: Some(output_filename.to_string()),
            bytes: format!("%PDF {}", output_filename).into_bytes(),
        })
    }

    async fn download_all(&self, download_id: &DownloadId) -> AppResult<DownloadedFile> {
        self.record(format!("download_all:{}", download_id));
        Ok(DownloadedFile {
            suggested_name: None,
            bytes: b"PK".to_vec(),
        })
    }

    async fn cleanup(&self, file_id: &FileId) -> AppResult<()> {
        self.record(format!("cleanup:{}", file_id));
        if self.cleanup_fails.load(Ordering::SeqCst) {
            Err(AppError::service("/api/cleanup", "Fehler beim Aufräumen"))
        } else {
            Ok(())
        }
    }
}

// ========== 测试数据 ==========

fn upload_receipt(file_id: &str) -> UploadReceipt {
    let segments = vec![
        Segment::with_declared_page_count(1, 1, 3, 3, 6, None, true).unwrap(),
        Segment::with_declared_page_count(2, 4, 6, 3, 6, None, true).unwrap(),
    ];
    UploadReceipt {
        file_id: FileId::new(file_id),
        filename: "doc.pdf".to_string(),
        analysis: Analysis::new(6, 2, segments).unwrap(),
    }
}

fn split_receipt() -> SplitReceipt {
    SplitReceipt {
        download_id: DownloadId::new("xyz"),
        results: vec![
            SplitResult::new(1, "doc_1.pdf", 3, None).unwrap(),
            SplitResult::new(2, "doc_2.pdf", 3, None).unwrap(),
        ],
    }
}

fn pdf() -> SourceFile {
    SourceFile::from_path("/in/doc.pdf")
}

struct Fixture {
    api: Arc<FakeApi>,
    orchestrator: Arc<Orchestrator>,
    downloads: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let api = Arc::new(FakeApi::default());
    let downloads = tempfile::tempdir().unwrap();
    let orchestrator = Arc::new(Orchestrator::with_download_dir(
        api.clone(),
        downloads.path(),
    ));
    Fixture {
        api,
        orchestrator,
        downloads,
    }
}

async fn analyzed() -> Fixture {
    let fx = fixture();
    fx.api.push_upload(Ok(upload_receipt("abc")));
    assert_ok!(fx.orchestrator.submit_file(pdf()).await);
    fx
}

async fn completed() -> Fixture {
    let fx = analyzed().await;
    fx.api.push_split(Ok(split_receipt()));
    assert_ok!(fx.orchestrator.request_split().await);
    fx
}

async fn wait_for_phase(orchestrator: &Orchestrator, phase: PhaseKind) {
    let mut updates = orchestrator.subscribe();
    updates
        .wait_for(|session| session.phase_kind() == phase)
        .await
        .unwrap();
}

// ========== 正常流程 ==========

#[tokio::test]
async fn upload_success_moves_to_analyzed() {
    let fx = fixture();
    fx.api.push_upload(Ok(upload_receipt("abc")));

    let step = assert_ok!(fx.orchestrator.offer_files(vec![pdf()]).await);
    assert_eq!(step, Some(StepResult::Applied));

    let session = fx.orchestrator.snapshot();
    assert_eq!(session.phase_kind(), PhaseKind::Analyzed);
    assert_eq!(session.file_id(), Some(&FileId::new("abc")));
    assert_eq!(session.original_filename(), Some("doc.pdf"));
    assert_eq!(session.analysis().unwrap().segments().len(), 2);
    assert!(session.download_id().is_none());
    assert!(session.source_file().is_none());
    assert_eq!(fx.orchestrator.acquisitor().selected(), Some(pdf()));
    assert_eq!(fx.api.calls(), vec!["upload:doc.pdf"]);
}

#[tokio::test]
async fn split_success_moves_to_completed_and_bundle_targets_download_id() {
    let fx = analyzed().await;
    fx.api.push_split(Ok(split_receipt()));

    assert_eq!(
        assert_ok!(fx.orchestrator.request_split().await),
        StepResult::Applied
    );

    let session = fx.orchestrator.snapshot();
    assert_eq!(session.phase_kind(), PhaseKind::Completed);
    assert_eq!(session.download_id(), Some(&DownloadId::new("xyz")));
    assert_eq!(session.split_results().unwrap().len(), 2);
    assert_eq!(session.file_id(), Some(&FileId::new("abc")));

    let path = assert_ok!(fx.orchestrator.download_all().await);
    assert_eq!(path, fx.downloads.path().join("invoices_xyz.zip"));
    assert_eq!(std::fs::read(&path).unwrap(), b"PK".to_vec());
    assert!(fx.api.calls().contains(&"split:abc:doc.pdf".to_string()));
    assert!(fx.api.calls().contains(&"download_all:xyz".to_string()));
}

#[tokio::test]
async fn download_one_is_idempotent_and_leaves_session_alone() {
    let fx = completed().await;
    let before = fx.orchestrator.snapshot();
    let download_id = DownloadId::new("xyz");

    let first = assert_ok!(fx.orchestrator.download_one(&download_id, "doc_2.pdf").await);
    let second = assert_ok!(fx.orchestrator.download_one(&download_id, "doc_2.pdf").await);

    assert_eq!(first, second);
    assert_eq!(std::fs::read(&first).unwrap(), b"%PDF doc_2.pdf".to_vec());
    assert_eq!(fx.orchestrator.snapshot(), before);
}

#[tokio::test]
async fn subscribers_observe_latest_session() {
    let fx = fixture();
    let mut updates = fx.orchestrator.subscribe();
    fx.api.push_upload(Ok(upload_receipt("abc")));

    assert_ok!(fx.orchestrator.submit_file(pdf()).await);

    assert!(updates.has_changed().unwrap());
    let session = updates.borrow_and_update().clone();
    assert_eq!(session.phase_kind(), PhaseKind::Analyzed);
}

// ========== 错误处理 ==========

#[tokio::test]
async fn rejected_upload_returns_to_idle_with_message() {
    let fx = fixture();
    fx.api
        .push_upload(Err(AppError::service("/api/upload", "corrupt file")));

    let err = assert_err!(fx.orchestrator.submit_file(pdf()).await);
    assert_eq!(err.user_message(), "corrupt file");

    let session = fx.orchestrator.snapshot();
    assert_eq!(session.phase_kind(), PhaseKind::Idle);
    assert_eq!(session.last_error(), Some("corrupt file"));
    assert!(session.file_id().is_none());
    assert!(session.analysis().is_none());
}

#[tokio::test]
async fn invalid_response_during_upload_returns_to_idle() {
    let fx = fixture();
    fx.api.push_upload(Err(AppError::invalid_response(
        "/api/upload",
        "缺少 file_id",
    )));

    let err = assert_err!(fx.orchestrator.submit_file(pdf()).await);
    assert!(matches!(err, AppError::Transport(_)));
    assert_eq!(fx.orchestrator.snapshot().phase_kind(), PhaseKind::Idle);
    assert!(fx.orchestrator.snapshot().last_error().is_some());
}

#[tokio::test]
async fn invalid_receipt_releases_assigned_file_id() {
    let fx = fixture();
    fx.api.push_upload(Err(TransportError::InvalidReceipt {
        endpoint: "/api/upload".to_string(),
        file_id: FileId::new("leak"),
        reason: "片段 #1 的页码范围 1-8 超出 1-6".to_string(),
    }
    .into()));

    assert_err!(fx.orchestrator.submit_file(pdf()).await);

    let session = fx.orchestrator.snapshot();
    assert_eq!(session.phase_kind(), PhaseKind::Idle);
    assert!(session.file_id().is_none());
    assert!(session.last_error().is_some());
    assert_eq!(fx.api.calls(), vec!["upload:doc.pdf", "cleanup:leak"]);

    fx.orchestrator.reset().await;
    assert_eq!(
        fx.api.calls().iter().filter(|c| c.starts_with("cleanup")).count(),
        1
    );
}

#[tokio::test]
async fn late_invalid_receipt_after_reset_is_still_released() {
    let fx = fixture();
    let gate = fx.api.push_gated_upload(Err(TransportError::InvalidReceipt {
        endpoint: "/api/upload".to_string(),
        file_id: FileId::new("late-leak"),
        reason: "缺少 filename".to_string(),
    }
    .into()));

    let orchestrator = fx.orchestrator.clone();
    let pending = tokio::spawn(async move { orchestrator.submit_file(pdf()).await });

    wait_for_phase(&fx.orchestrator, PhaseKind::Uploading).await;
    fx.orchestrator.reset().await;
    gate.notify_one();

    assert_eq!(assert_ok!(pending.await.unwrap()), StepResult::Stale);
    assert!(fx.orchestrator.snapshot().last_error().is_none());
    assert!(fx.api.calls().contains(&"cleanup:late-leak".to_string()));
}

#[tokio::test]
async fn non_pdf_never_reaches_the_network() {
    let fx = fixture();

    let err = assert_err!(
        fx.orchestrator
            .offer_files(vec![SourceFile::from_path("report.docx")])
            .await
    );

    assert!(matches!(err, AppError::Validation(_)));
    assert!(fx.api.calls().is_empty());
    assert!(fx.orchestrator.acquisitor().selected().is_none());
    let session = fx.orchestrator.snapshot();
    assert_eq!(session.phase_kind(), PhaseKind::Idle);
    assert_eq!(session.epoch(), 0);
    assert!(session.last_error().is_none());
}

#[tokio::test]
async fn empty_offer_does_nothing() {
    let fx = fixture();
    assert_eq!(assert_ok!(fx.orchestrator.offer_files(Vec::new()).await), None);
    assert!(fx.api.calls().is_empty());
}

#[tokio::test]
async fn failed_split_keeps_analysis_and_allows_retry() {
    let fx = analyzed().await;
    fx.api
        .push_split(Err(AppError::service("/api/split", "Datei nicht gefunden")));

    let err = assert_err!(fx.orchestrator.request_split().await);
    assert_eq!(err.user_message(), "Datei nicht gefunden");

    let session = fx.orchestrator.snapshot();
    assert_eq!(session.phase_kind(), PhaseKind::Analyzed);
    assert_eq!(session.file_id(), Some(&FileId::new("abc")));
    assert_eq!(session.last_error(), Some("Datei nicht gefunden"));

    fx.api.push_split(Ok(split_receipt()));
    assert_ok!(fx.orchestrator.request_split().await);

    let session = fx.orchestrator.snapshot();
    assert_eq!(session.phase_kind(), PhaseKind::Completed);
    assert!(session.last_error().is_none());
}

#[tokio::test]
async fn operations_in_wrong_phase_are_rejected_without_side_effects() {
    let fx = fixture();

    let err = assert_err!(fx.orchestrator.request_split().await);
    assert!(matches!(
        err,
        AppError::Workflow(WorkflowError::InvalidPhase {
            operation: "request_split",
            phase: PhaseKind::Idle
        })
    ));
    assert_err!(fx.orchestrator.download_all().await);
    assert_err!(
        fx.orchestrator
            .download_one(&DownloadId::new("xyz"), "doc_1.pdf")
            .await
    );
    assert!(fx.api.calls().is_empty());
    assert_eq!(fx.orchestrator.snapshot().epoch(), 0);
}

#[tokio::test]
async fn new_file_while_analysis_is_displayed_is_rejected() {
    let fx = analyzed().await;
    let before = fx.orchestrator.snapshot();

    let err = assert_err!(
        fx.orchestrator
            .offer_files(vec![SourceFile::from_path("/in/other.pdf")])
            .await
    );

    assert!(matches!(
        err,
        AppError::Workflow(WorkflowError::InvalidPhase {
            phase: PhaseKind::Analyzed,
            ..
        })
    ));
    assert_eq!(fx.orchestrator.snapshot(), before);
    assert_eq!(fx.orchestrator.acquisitor().selected(), Some(pdf()));
    assert_eq!(fx.api.calls(), vec!["upload:doc.pdf"]);
}

#[tokio::test]
async fn download_of_unknown_file_is_rejected() {
    let fx = completed().await;

    let err = assert_err!(
        fx.orchestrator
            .download_one(&DownloadId::new("xyz"), "doc_9.pdf")
            .await
    );
    assert!(matches!(
        err,
        AppError::Workflow(WorkflowError::UnknownDownload { .. })
    ));

    let err = assert_err!(
        fx.orchestrator
            .download_one(&DownloadId::new("other"), "doc_1.pdf")
            .await
    );
    assert!(matches!(
        err,
        AppError::Workflow(WorkflowError::UnknownDownload { .. })
    ));
    assert!(!fx.api.calls().iter().any(|c| c.starts_with("download_one")));
}

// ========== 重置 ==========

#[tokio::test]
async fn reset_clears_everything_even_when_cleanup_fails() {
    let fx = completed().await;
    fx.api.cleanup_fails.store(true, Ordering::SeqCst);
    assert!(fx.orchestrator.acquisitor().selected().is_some());

    fx.orchestrator.reset().await;

    let session = fx.orchestrator.snapshot();
    assert_eq!(session.phase_kind(), PhaseKind::Idle);
    assert!(session.file_id().is_none());
    assert!(session.analysis().is_none());
    assert!(session.split_results().is_none());
    assert!(session.download_id().is_none());
    assert!(session.last_error().is_none());
    assert!(fx.orchestrator.acquisitor().selected().is_none());
    assert!(fx.api.calls().contains(&"cleanup:abc".to_string()));
}

#[tokio::test]
async fn reset_from_idle_skips_cleanup() {
    let fx = fixture();
    fx.orchestrator.reset().await;

    assert_eq!(fx.orchestrator.snapshot().phase_kind(), PhaseKind::Idle);
    assert!(fx.api.calls().is_empty());
}

#[tokio::test]
async fn reset_then_new_upload_starts_fresh_session() {
    let fx = completed().await;
    fx.orchestrator.reset().await;

    fx.api.push_upload(Ok(upload_receipt("def")));
    assert_ok!(fx.orchestrator.submit_file(pdf()).await);

    let session = fx.orchestrator.snapshot();
    assert_eq!(session.phase_kind(), PhaseKind::Analyzed);
    assert_eq!(session.file_id(), Some(&FileId::new("def")));
    assert!(session.download_id().is_none());
}

// ========== 过期响应 ==========

#[tokio::test]
async fn late_upload_after_reset_is_discarded_and_released() {
    let fx = fixture();
    let gate = fx.api.push_gated_upload(Ok(upload_receipt("late")));

    let orchestrator = fx.orchestrator.clone();
    let pending = tokio::spawn(async move { orchestrator.submit_file(pdf()).await });

    wait_for_phase(&fx.orchestrator, PhaseKind::Uploading).await;
    fx.orchestrator.reset().await;
    gate.notify_one();

    let step = assert_ok!(pending.await.unwrap());
    assert_eq!(step, StepResult::Stale);

    let session = fx.orchestrator.snapshot();
    assert_eq!(session.phase_kind(), PhaseKind::Idle);
    assert!(session.file_id().is_none());
    assert!(session.analysis().is_none());
    assert!(fx.api.calls().contains(&"cleanup:late".to_string()));
}

#[tokio::test]
async fn late_upload_failure_after_reset_is_not_surfaced() {
    let fx = fixture();
    let gate = fx
        .api
        .push_gated_upload(Err(AppError::service("/api/upload", "corrupt file")));

    let orchestrator = fx.orchestrator.clone();
    let pending = tokio::spawn(async move { orchestrator.submit_file(pdf()).await });

    wait_for_phase(&fx.orchestrator, PhaseKind::Uploading).await;
    fx.orchestrator.reset().await;
    gate.notify_one();

    assert_eq!(assert_ok!(pending.await.unwrap()), StepResult::Stale);
    assert!(fx.orchestrator.snapshot().last_error().is_none());
}

#[tokio::test]
async fn late_upload_does_not_clobber_newer_session() {
    let fx = fixture();
    let gate = fx.api.push_gated_upload(Ok(upload_receipt("old")));

    let orchestrator = fx.orchestrator.clone();
    let pending = tokio::spawn(async move { orchestrator.submit_file(pdf()).await });

    wait_for_phase(&fx.orchestrator, PhaseKind::Uploading).await;
    fx.orchestrator.reset().await;

    fx.api.push_upload(Ok(upload_receipt("new")));
    assert_ok!(fx.orchestrator.submit_file(pdf()).await);

    gate.notify_one();
    assert_eq!(assert_ok!(pending.await.unwrap()), StepResult::Stale);

    let session = fx.orchestrator.snapshot();
    assert_eq!(session.phase_kind(), PhaseKind::Analyzed);
    assert_eq!(session.file_id(), Some(&FileId::new("new")));
}

#[tokio::test]
async fn late_split_after_reset_is_discarded() {
    let fx = analyzed().await;
    let gate = fx.api.push_gated_split(Ok(split_receipt()));

    let orchestrator = fx.orchestrator.clone();
    let pending = tokio::spawn(async move { orchestrator.request_split().await });

    wait_for_phase(&fx.orchestrator, PhaseKind::Splitting).await;
    fx.orchestrator.reset().await;
    gate.notify_one();

    assert_eq!(assert_ok!(pending.await.unwrap()), StepResult::Stale);

    let session = fx.orchestrator.snapshot();
    assert_eq!(session.phase_kind(), PhaseKind::Idle);
    assert!(session.download_id().is_none());
    assert!(session.split_results().is_none());
}

#[tokio::test]
async fn split_is_not_issued_while_upload_is_in_flight() {
    let fx = fixture();
    let gate = fx.api.push_gated_upload(Ok(upload_receipt("abc")));

    let orchestrator = fx.orchestrator.clone();
    let pending = tokio::spawn(async move { orchestrator.submit_file(pdf()).await });

    wait_for_phase(&fx.orchestrator, PhaseKind::Uploading).await;
    let err = assert_err!(fx.orchestrator.request_split().await);
    assert!(matches!(
        err,
        AppError::Workflow(WorkflowError::InvalidPhase {
            phase: PhaseKind::Uploading,
            ..
        })
    ));

    gate.notify_one();
    assert_eq!(assert_ok!(pending.await.unwrap()), StepResult::Applied);
    assert!(!fx.api.calls().iter().any(|c| c.starts_with("split")));
}
