pub mod render;

use crate::db::RecordStore;
use crate::proposal;
use crate::session::ProposalSession;
use log::{debug, warn};
use render::HtmlRenderer;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Renders proposal PDFs on demand and remembers them. A Record's
/// `pdf_path` is only ever written after a render fully succeeded, so a
/// failed or interrupted render can never leave a corrupt file referenced.
pub struct PdfMaterializer {
    store: Arc<RecordStore>,
    renderer: Arc<dyn HtmlRenderer>,
    out_dir: PathBuf,
}

impl PdfMaterializer {
    pub fn new(store: Arc<RecordStore>, renderer: Arc<dyn HtmlRenderer>, out_dir: PathBuf) -> Self {
        Self {
            store,
            renderer,
            out_dir,
        }
    }

    /// The cached or freshly rendered PDF for `filename`, or None when the
    /// Record is missing, no HTML can be derived, or rendering fails.
    /// `html_hint` is HTML the caller already holds (the review screen's
    /// rendition); without it the HTML is derived from the stored proposal.
    pub async fn ensure_pdf(&self, filename: &str, html_hint: Option<&str>) -> Option<PathBuf> {
        let record = match self.store.get(filename) {
            Ok(Some(rec)) => rec,
            Ok(None) => {
                debug!("ensure_pdf: no record for {filename}");
                return None;
            }
            Err(e) => {
                warn!("ensure_pdf: record lookup failed for {filename}: {e}");
                return None;
            }
        };

        if let Some(path) = record.pdf_path.as_deref() {
            let path = Path::new(path);
            if path.exists() {
                debug!("ensure_pdf: cache hit for {filename}");
                return Some(path.to_path_buf());
            }
            debug!("ensure_pdf: recorded PDF for {filename} is gone, re-rendering");
        }

        let html = match html_hint.filter(|h| !h.trim().is_empty()) {
            Some(h) => h.to_string(),
            None => {
                let json = record.proposal_json.as_deref().filter(|j| !j.trim().is_empty());
                match json.and_then(proposal::extract_html_str) {
                    Some(h) => h,
                    None => {
                        warn!("ensure_pdf: no HTML available for {filename}");
                        return None;
                    }
                }
            }
        };

        if let Err(e) = std::fs::create_dir_all(&self.out_dir) {
            warn!("ensure_pdf: cannot create {}: {e}", self.out_dir.display());
            return None;
        }

        // Render to a temporary name and only rename into place on
        // success; the Record points at the final path alone.
        let final_path = self.out_dir.join(format!("{filename}_proposal.pdf"));
        let tmp_path = self
            .out_dir
            .join(format!(".{}.pdf.part", uuid::Uuid::new_v4()));
        let renderer = Arc::clone(&self.renderer);
        let render_input = html.clone();
        let render_target = tmp_path.clone();
        let rendered =
            tokio::task::spawn_blocking(move || renderer.render(&render_input, &render_target))
                .await;

        match rendered {
            Ok(Ok(tmp)) => {
                if let Err(e) = std::fs::rename(&tmp, &final_path) {
                    warn!("ensure_pdf: failed to move rendered PDF for {filename}: {e}");
                    let _ = std::fs::remove_file(&tmp);
                    return None;
                }
                if let Err(e) = self
                    .store
                    .save_pdf_path_for_file(filename, &final_path.to_string_lossy())
                {
                    warn!("ensure_pdf: failed to record PDF path for {filename}: {e}");
                }
                debug!("ensure_pdf: rendered {}", final_path.display());
                Some(final_path)
            }
            Ok(Err(e)) => {
                warn!("ensure_pdf: render failed for {filename}: {e}");
                let _ = std::fs::remove_file(&tmp_path);
                None
            }
            Err(e) => {
                warn!("ensure_pdf: render task failed for {filename}: {e}");
                None
            }
        }
    }

    /// Save/share acts on whatever was generated last, not a
    /// navigation-scoped filename.
    pub async fn ensure_pdf_for_last(
        &self,
        session: &ProposalSession,
        html_hint: Option<&str>,
    ) -> Option<PathBuf> {
        let last = match session.last_proposal_file() {
            Some(name) => name,
            None => {
                debug!("ensure_pdf: no proposal generated yet");
                return None;
            }
        };
        self.ensure_pdf(&last, html_hint).await
    }
}

#[cfg(test)]
mod tests {
    use super::render::{HtmlRenderer, RenderError};
    use super::*;
    use crate::db::DEFAULT_RECENT_LIMIT;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRenderer {
        calls: AtomicUsize,
    }

    impl FakeRenderer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl HtmlRenderer for FakeRenderer {
        fn render(&self, html: &str, output: &std::path::Path) -> Result<PathBuf, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::fs::write(output, format!("%PDF {}", html.len()))?;
            Ok(output.to_path_buf())
        }
    }

    struct FailingRenderer;

    impl HtmlRenderer for FailingRenderer {
        fn render(&self, _html: &str, _output: &std::path::Path) -> Result<PathBuf, RenderError> {
            Err(RenderError::NoOutput)
        }
    }

    fn setup(
        renderer: Arc<dyn HtmlRenderer>,
    ) -> (tempfile::TempDir, Arc<RecordStore>, PdfMaterializer) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RecordStore::open(dir.path(), DEFAULT_RECENT_LIMIT).unwrap());
        let pdf = PdfMaterializer::new(Arc::clone(&store), renderer, dir.path().join("pdf"));
        (dir, store, pdf)
    }

    #[tokio::test]
    async fn test_second_call_is_a_cache_hit() {
        let fake = FakeRenderer::new();
        let (_dir, store, pdf) = setup(fake.clone());
        store
            .save_proposal_for_file("a.pdf", "{\"reportHtml\": \"<html>x</html>\"}", None)
            .unwrap();

        let first = pdf.ensure_pdf("a.pdf", None).await.unwrap();
        let second = pdf.ensure_pdf("a.pdf", None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fake.calls(), 1);
        assert_eq!(
            store.get_pdf_path_for_file("a.pdf").unwrap().as_deref(),
            Some(first.to_string_lossy().as_ref())
        );
    }

    #[tokio::test]
    async fn test_new_proposal_invalidates_cached_pdf() {
        let fake = FakeRenderer::new();
        let (_dir, store, pdf) = setup(fake.clone());
        store
            .save_proposal_for_file("a.pdf", "{\"reportHtml\": \"<html>v1</html>\"}", None)
            .unwrap();
        pdf.ensure_pdf("a.pdf", None).await.unwrap();

        // Saving a newer proposal drops the recorded path, so the next
        // save/share renders the new content instead of the stale file.
        store
            .save_proposal_for_file("a.pdf", "{\"reportHtml\": \"<html>v2</html>\"}", None)
            .unwrap();
        assert!(store.get_pdf_path_for_file("a.pdf").unwrap().is_none());
        pdf.ensure_pdf("a.pdf", None).await.unwrap();
        assert_eq!(fake.calls(), 2);
    }

    #[tokio::test]
    async fn test_cleared_pdf_path_forces_fresh_render() {
        let fake = FakeRenderer::new();
        let (_dir, store, pdf) = setup(fake.clone());
        store
            .save_proposal_for_file("a.pdf", "{\"reportHtml\": \"<html>v1</html>\"}", None)
            .unwrap();
        let first = pdf.ensure_pdf("a.pdf", None).await.unwrap();

        // An edit lands directly in the record without going through
        // save_proposal_for_file; the caller then clears the stale path.
        store
            .upsert(
                "a.pdf",
                crate::db::models::RecordPatch {
                    proposal_json: Some("{\"reportHtml\": \"<html>v2</html>\"}".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        store.clear_pdf_path_for_file("a.pdf").unwrap();

        let second = pdf.ensure_pdf("a.pdf", None).await.unwrap();
        assert_eq!(first, second); // same destination name
        assert_eq!(fake.calls(), 2); // but freshly rendered content
    }

    #[tokio::test]
    async fn test_missing_record_yields_none() {
        let fake = FakeRenderer::new();
        let (_dir, _store, pdf) = setup(fake.clone());
        assert!(pdf.ensure_pdf("nope.pdf", Some("<html></html>")).await.is_none());
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_proposal_and_no_hint_yields_none() {
        let fake = FakeRenderer::new();
        let (_dir, store, pdf) = setup(fake.clone());
        store.save_srs_for_file("a.pdf", "{}").unwrap();
        assert!(pdf.ensure_pdf("a.pdf", None).await.is_none());
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_hint_renders_without_stored_proposal() {
        let fake = FakeRenderer::new();
        let (_dir, store, pdf) = setup(fake.clone());
        store.save_srs_for_file("a.pdf", "{}").unwrap();
        let path = pdf.ensure_pdf("a.pdf", Some("<html>hint</html>")).await;
        assert!(path.is_some());
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn test_render_failure_leaves_record_untouched() {
        let (_dir, store, pdf) = setup(Arc::new(FailingRenderer));
        store
            .save_proposal_for_file("a.pdf", "{\"reportHtml\": \"<html>x</html>\"}", None)
            .unwrap();
        assert!(pdf.ensure_pdf("a.pdf", None).await.is_none());
        assert!(store.get_pdf_path_for_file("a.pdf").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ensure_pdf_for_last_follows_session() {
        let fake = FakeRenderer::new();
        let (_dir, store, pdf) = setup(fake.clone());
        let session = ProposalSession::new();
        assert!(pdf.ensure_pdf_for_last(&session, None).await.is_none());

        store
            .save_proposal_for_file("b.pdf", "{\"reportHtml\": \"<html>x</html>\"}", None)
            .unwrap();
        session.set_last_proposal_file("b.pdf");
        let path = pdf.ensure_pdf_for_last(&session, None).await.unwrap();
        assert!(path.to_string_lossy().contains("b.pdf_proposal.pdf"));
    }
}
