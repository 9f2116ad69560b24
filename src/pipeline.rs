//! Menu analysis pipeline.
//!
//! One run threads a single [`AnalysisContext`] through a fixed chain of
//! states on a background task:
//!
//! ```text
//! VisionAnalysis -> CategoryAnalysis -> MapResult -> Success
//!        \                 \                \
//!         `-----------------`----------------`---> Error
//! ```
//!
//! Every working state either names the next state or records an error and
//! moves to `Error`. The two terminal states publish the outcome on a oneshot
//! channel and end the run, so a run delivers at most one message and the
//! [`AnalysisHandle`] turns "no message" into [`AnalysisError::Interrupted`].

use crate::categorize;
use crate::completion::CompletionService;
use crate::error::{AnalysisError, Stage};
use crate::mapper;
use crate::schema::{MenuAnalysis, StructuredMenu, VisionExtraction};
use crate::shape::describe_type;
use crate::vision::{VisionService, VisionUpload};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

pub type AnalysisOutcome = Result<MenuAnalysis, AnalysisError>;

/// Uploaded menu photo. The reader is consumed exactly once by the vision state.
pub struct MenuFile {
    pub filename: String,
    pub content_type: String,
    reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl MenuFile {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            reader: Box::new(reader),
        }
    }

    pub fn from_bytes(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self::new(filename, content_type, std::io::Cursor::new(data.into()))
    }
}

/// Pipeline states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    VisionAnalysis,
    CategoryAnalysis,
    MapResult,
    Success,
    Error,
}

impl State {
    fn is_terminal(self) -> bool {
        matches!(self, State::Success | State::Error)
    }
}

/// Mutable per-run state, owned by the run's task.
pub struct AnalysisContext {
    file: Option<MenuFile>,
    source_file: String,
    image_digest: String,
    vision_result: VisionExtraction,
    raw_category_result: String,
    category_result: Option<StructuredMenu>,
    error: Option<AnalysisError>,
    reply: Option<oneshot::Sender<AnalysisOutcome>>,
}

impl AnalysisContext {
    fn new(file: MenuFile, reply: oneshot::Sender<AnalysisOutcome>) -> Self {
        Self {
            source_file: file.filename.clone(),
            file: Some(file),
            image_digest: String::new(),
            vision_result: VisionExtraction::new(),
            raw_category_result: String::new(),
            category_result: None,
            error: None,
            reply: Some(reply),
        }
    }

    fn fail(&mut self, err: AnalysisError) -> Option<State> {
        self.error = Some(err);
        Some(State::Error)
    }

    /// True once the caller has dropped its handle.
    fn abandoned(&self) -> bool {
        self.reply.as_ref().map_or(true, |reply| reply.is_closed())
    }

    fn publish(&mut self, outcome: AnalysisOutcome) {
        if let Some(reply) = self.reply.take() {
            if reply.send(outcome).is_err() {
                debug!("Analysis caller went away before the outcome was delivered");
            }
        }
    }
}

/// Receiving side of one run.
pub struct AnalysisHandle {
    rx: oneshot::Receiver<AnalysisOutcome>,
}

impl AnalysisHandle {
    /// Wait for the run's single outcome.
    pub async fn outcome(self) -> AnalysisOutcome {
        self.rx
            .await
            .unwrap_or_else(|_| Err(AnalysisError::Interrupted))
    }
}

/// Starts pipeline runs against a vision and a completion backend.
#[derive(Clone)]
pub struct Analyzer {
    vision: Arc<dyn VisionService>,
    completion: Arc<dyn CompletionService>,
    schema_description: Arc<str>,
}

impl Analyzer {
    pub fn new(vision: Arc<dyn VisionService>, completion: Arc<dyn CompletionService>) -> Self {
        let schema_description = describe_type::<StructuredMenu>();
        debug!("Menu schema description:\n{}", schema_description);
        Self {
            vision,
            completion,
            schema_description: schema_description.into(),
        }
    }

    /// Start a run on a background task and return immediately.
    pub fn start(&self, file: MenuFile) -> AnalysisHandle {
        info!("Starting menu analysis for {}", file.filename);
        let (tx, rx) = oneshot::channel();
        let context = AnalysisContext::new(file, tx);
        let analyzer = self.clone();
        tokio::spawn(async move { analyzer.run(context).await });
        AnalysisHandle { rx }
    }

    /// Start a run and wait for its outcome.
    pub async fn analyze(&self, file: MenuFile) -> AnalysisOutcome {
        self.start(file).outcome().await
    }

    async fn run(&self, mut ctx: AnalysisContext) {
        let mut state = Some(State::VisionAnalysis);
        while let Some(current) = state {
            if !current.is_terminal() && ctx.abandoned() {
                info!(
                    "Abandoning analysis of {} before {:?}: caller stopped waiting",
                    ctx.source_file, current
                );
                return;
            }
            state = self.step(current, &mut ctx).await;
        }
    }

    async fn step(&self, state: State, ctx: &mut AnalysisContext) -> Option<State> {
        match state {
            State::VisionAnalysis => self.vision_analysis(ctx).await,
            State::CategoryAnalysis => self.category_analysis(ctx).await,
            State::MapResult => map_result(ctx),
            State::Success => on_success(ctx),
            State::Error => on_error(ctx),
        }
    }

    async fn vision_analysis(&self, ctx: &mut AnalysisContext) -> Option<State> {
        info!("Vision analysis ({})", self.vision.name());

        let Some(mut file) = ctx.file.take() else {
            return ctx.fail(AnalysisError::Transport {
                stage: Stage::Vision,
                message: "menu file was already consumed".to_string(),
            });
        };

        let mut data = Vec::new();
        if let Err(e) = file.reader.read_to_end(&mut data).await {
            return ctx.fail(AnalysisError::Transport {
                stage: Stage::Vision,
                message: format!("failed to read uploaded file: {}", e),
            });
        }

        ctx.image_digest = {
            let mut hasher = Sha256::new();
            hasher.update(&data);
            format!("{:x}", hasher.finalize())
        };
        debug!("Read {} bytes from {} ({})", data.len(), file.filename, ctx.image_digest);

        let upload = VisionUpload {
            filename: file.filename,
            content_type: file.content_type,
            data,
        };

        match self.vision.extract(upload).await {
            Ok(extraction) => {
                debug!("Vision result has {} top-level keys", extraction.len());
                ctx.vision_result = extraction;
                Some(State::CategoryAnalysis)
            }
            Err(e) => ctx.fail(AnalysisError::from_service(Stage::Vision, e)),
        }
    }

    async fn category_analysis(&self, ctx: &mut AnalysisContext) -> Option<State> {
        info!("Category analysis");

        match categorize::categorize(
            self.completion.as_ref(),
            &self.schema_description,
            &ctx.vision_result,
        )
        .await
        {
            Ok(raw) => {
                debug!("Raw categorization result: {} chars", raw.len());
                ctx.raw_category_result = raw;
                Some(State::MapResult)
            }
            Err(e) => ctx.fail(e),
        }
    }
}

fn map_result(ctx: &mut AnalysisContext) -> Option<State> {
    info!("Mapping categorization result");

    match mapper::parse_menu(&ctx.raw_category_result) {
        Ok(menu) => {
            ctx.category_result = Some(menu);
            Some(State::Success)
        }
        Err(e) => ctx.fail(e),
    }
}

fn on_success(ctx: &mut AnalysisContext) -> Option<State> {
    let Some(category_result) = ctx.category_result.take() else {
        let raw = ctx.raw_category_result.clone();
        return ctx.fail(AnalysisError::Parse {
            message: "no menu was mapped from the categorization result".to_string(),
            raw,
        });
    };
    info!(
        "Analysis of {} complete: {} categories, {} items",
        ctx.source_file,
        category_result.categories.len(),
        category_result.item_count()
    );

    let analysis = MenuAnalysis {
        id: None,
        venue_id: None,
        source_file: std::mem::take(&mut ctx.source_file),
        image_digest: std::mem::take(&mut ctx.image_digest),
        vision_result: std::mem::take(&mut ctx.vision_result),
        raw_category_result: std::mem::take(&mut ctx.raw_category_result),
        category_result,
        created_at: None,
    };
    ctx.publish(Ok(analysis));
    None
}

fn on_error(ctx: &mut AnalysisContext) -> Option<State> {
    let err = ctx.error.take().unwrap_or(AnalysisError::Interrupted);
    error!(
        "Stopping analysis of {} ({:?}): {}",
        ctx.source_file,
        err.cause(),
        err
    );
    if let Some(raw) = err.raw_completion() {
        debug!("Raw categorization result: {}", raw);
    }
    ctx.publish(Err(err));
    None
}
