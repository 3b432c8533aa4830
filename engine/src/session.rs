//! State of one interactive studio session.
//!
//! Everything the user can change lives here and is only mutated through
//! `&mut Session`, one event at a time. A generation is split in three steps
//! so a front-end can keep drawing while the request is in flight:
//! [`Session::begin_generation`] checks the gates and snapshots the inputs,
//! [`PendingGeneration::run`] does the encoding and the HTTP call without
//! touching the session, and [`Session::finish_generation`] folds the result
//! back in. [`Session::generate`] chains the three.

use std::time::Instant;

use log::{debug, info, warn};

use crate::{
    encoding::{Attachment, encode_all},
    gallery::GeneratedImage,
    gemini_api::{
        GenerationError, InlineImage, Transport, build_request, endpoint_preview, parse_response,
        resolve_url,
    },
    model::{Model, max_images},
    notice::ErrorSlot,
    params::{AspectRatio, GenerationParams, Resolution},
};

/// Entered at runtime, never written anywhere by the engine.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub api_key: String,
    /// Empty means the default Google host.
    pub endpoint: String,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct Session {
    settings: Settings,
    params: GenerationParams,
    attachments: Vec<Attachment>,
    generating: bool,
    /// Newest first.
    gallery: Vec<GeneratedImage>,
    error: ErrorSlot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// A generation was already running, nothing happened.
    Busy,
    Failed(String),
    Generated(usize),
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    pub fn model(&self) -> Model {
        self.params.model
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn gallery(&self) -> &[GeneratedImage] {
        &self.gallery
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn error(&self) -> Option<&str> {
        self.error.message()
    }

    pub fn error_at(&self, now: Instant) -> Option<&str> {
        self.error.message_at(now)
    }

    /// Request URL as shown to the user, without the key.
    pub fn endpoint_preview(&self) -> String {
        endpoint_preview(&self.settings.endpoint, self.params.model.id())
    }

    pub fn set_api_key(&mut self, api_key: impl Into<String>) {
        self.settings.api_key = api_key.into();
    }

    pub fn set_endpoint(&mut self, endpoint: impl Into<String>) {
        self.settings.endpoint = endpoint.into();
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.params.prompt = prompt.into();
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: AspectRatio) {
        self.params.aspect_ratio = aspect_ratio;
    }

    pub fn set_resolution(&mut self, resolution: Resolution) {
        self.params.resolution = resolution;
    }

    pub fn set_search(&mut self, enabled: bool) {
        self.params.search_enabled = enabled;
    }

    /// Switches model, dropping trailing attachments beyond the new cap.
    pub fn set_model(&mut self, model: Model) {
        if model == self.params.model {
            return;
        }
        self.params.model = model;

        let max = max_images(model);
        if self.attachments.len() > max {
            self.attachments.truncate(max);
            info!("Model switched to {model}, attachments truncated to {max}");
            self.error.set_transient(
                format!("Switched to the {model} model, reference images limited to {max}"),
                Instant::now(),
            );
        }
    }

    /// Whether the add-image control should be offered.
    pub fn can_attach(&self) -> bool {
        self.attachments.len() < max_images(self.params.model)
    }

    /// Admits as many files as there are free slots, in order, and returns how
    /// many were taken. Anything beyond the cap is dropped with a notice.
    pub fn attach(&mut self, files: impl IntoIterator<Item = Attachment>) -> usize {
        let files: Vec<Attachment> = files.into_iter().collect();
        if files.is_empty() {
            return 0;
        }

        let max = max_images(self.params.model);
        let free = max.saturating_sub(self.attachments.len());
        let limit_notice = GenerationError::UploadLimitExceeded { max };
        if free == 0 {
            self.error
                .set_transient(limit_notice.to_string(), Instant::now());
            return 0;
        }

        let offered = files.len();
        self.attachments.extend(files.into_iter().take(free));
        let taken = offered.min(free);
        if taken < offered {
            warn!("Dropped {} reference images over the cap of {max}", offered - taken);
            self.error
                .set_transient(limit_notice.to_string(), Instant::now());
        }
        taken
    }

    pub fn detach(&mut self, index: usize) -> Option<Attachment> {
        (index < self.attachments.len()).then(|| self.attachments.remove(index))
    }

    /// Returns `None` when generation can't start: either one is already
    /// running (silently ignored) or the key or prompt is missing (reported
    /// through the error slot).
    pub fn begin_generation(&mut self) -> Option<PendingGeneration> {
        if self.generating {
            debug!("generate ignored, a request is still in flight");
            return None;
        }
        if self.settings.api_key.trim().is_empty() {
            self.error.set(GenerationError::MissingApiKey.to_string());
            return None;
        }
        if self.params.prompt.trim().is_empty() {
            self.error.set(GenerationError::MissingPrompt.to_string());
            return None;
        }

        self.generating = true;
        self.error.clear();
        Some(PendingGeneration {
            params: self.params.clone(),
            attachments: self.attachments.clone(),
            url: resolve_url(
                &self.settings.endpoint,
                self.params.model.id(),
                self.settings.api_key.trim(),
            ),
            preview: self.endpoint_preview(),
        })
    }

    /// Clears the loading flag whatever the result was.
    pub fn finish_generation(&mut self, completed: CompletedGeneration) -> GenerateOutcome {
        self.generating = false;
        match completed.result {
            Ok(images) => {
                let mut gallery: Vec<GeneratedImage> = images
                    .iter()
                    .map(|img| GeneratedImage::new(img, completed.prompt.clone()))
                    .collect();
                let n = gallery.len();
                gallery.append(&mut self.gallery);
                self.gallery = gallery;
                info!("Added {n} images, gallery holds {}", self.gallery.len());
                GenerateOutcome::Generated(n)
            }
            Err(e) => {
                warn!("Generation failed: {e}");
                let message = e.to_string();
                self.error.set(message.clone());
                GenerateOutcome::Failed(message)
            }
        }
    }

    pub async fn generate<T: Transport + ?Sized>(&mut self, transport: &T) -> GenerateOutcome {
        if self.generating {
            return GenerateOutcome::Busy;
        }
        let Some(pending) = self.begin_generation() else {
            return GenerateOutcome::Failed(self.error().unwrap_or_default().to_string());
        };
        let completed = pending.run(transport).await;
        self.finish_generation(completed)
    }
}

/// Inputs captured when generation started.
#[derive(Debug, Clone)]
pub struct PendingGeneration {
    params: GenerationParams,
    attachments: Vec<Attachment>,
    url: String,
    preview: String,
}

#[derive(Debug)]
pub struct CompletedGeneration {
    pub prompt: String,
    pub result: Result<Vec<InlineImage>, GenerationError>,
}

impl PendingGeneration {
    pub async fn run<T: Transport + ?Sized>(self, transport: &T) -> CompletedGeneration {
        let result = self.request(transport).await;
        CompletedGeneration {
            prompt: self.params.prompt,
            result,
        }
    }

    async fn request<T: Transport + ?Sized>(
        &self,
        transport: &T,
    ) -> Result<Vec<InlineImage>, GenerationError> {
        let reference_images = encode_all(&self.attachments).await?;
        let body = build_request(&self.params, reference_images);
        info!(
            "Generating with {} ({} reference images) via {}",
            self.params.model.id(),
            self.attachments.len(),
            self.preview
        );
        let response = transport.post_json(&self.url, &body).await?;
        parse_response(response)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::{Value, json};

    use super::*;
    use crate::{
        gemini_api::{RequestBody, TransportFuture},
        notice::NOTICE_TTL,
    };

    enum Reply {
        Json(Value),
        Http(u16, &'static str),
    }

    struct FakeTransport {
        reply: Reply,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl FakeTransport {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                calls: Mutex::new(vec![]),
            }
        }

        fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Transport for FakeTransport {
        fn post_json<'a>(&'a self, url: &'a str, body: &'a RequestBody) -> TransportFuture<'a> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), serde_json::to_value(body).unwrap()));
            let res = match &self.reply {
                Reply::Json(v) => Ok(v.clone()),
                Reply::Http(status, body) => Err(GenerationError::from_error_body(*status, body)),
            };
            Box::pin(async move { res })
        }
    }

    fn two_images() -> Reply {
        Reply::Json(json!({
            "candidates": [{"content": {"parts": [
                {"text": "done"},
                {"inlineData": {"mimeType": "image/png", "data": "Zmlyc3Q="}},
                {"inlineData": {"mimeType": "image/jpeg", "data": "c2Vjb25k"}}
            ]}}]
        }))
    }

    fn attachment(n: usize) -> Attachment {
        Attachment::new(format!("ref{n}.png"), "image/png", format!("img{n}").into_bytes()).unwrap()
    }

    fn ready_session() -> Session {
        let mut session = Session::new(Settings {
            api_key: "K".into(),
            endpoint: String::new(),
        });
        session.set_prompt("a lighthouse at dusk");
        session
    }

    #[tokio::test]
    async fn empty_prompt_makes_no_call() {
        let transport = FakeTransport::new(two_images());
        let mut session = ready_session();
        session.set_prompt("");

        let outcome = session.generate(&transport).await;
        assert_eq!(outcome, GenerateOutcome::Failed("Please enter a prompt".into()));
        assert_eq!(session.error(), Some("Please enter a prompt"));
        assert!(session.gallery().is_empty());
        assert!(!session.is_generating());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_key_makes_no_call() {
        let transport = FakeTransport::new(two_images());
        let mut session = ready_session();
        session.set_api_key("   ");

        session.generate(&transport).await;
        assert_eq!(session.error(), Some("Please enter an API key"));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn images_are_prepended_newest_first() {
        let transport = FakeTransport::new(two_images());
        let mut session = ready_session();
        session.set_endpoint("https://proxy.example.com/");

        assert_eq!(session.generate(&transport).await, GenerateOutcome::Generated(2));
        session.set_prompt("a second prompt");
        assert_eq!(session.generate(&transport).await, GenerateOutcome::Generated(2));

        let gallery = session.gallery();
        assert_eq!(gallery.len(), 4);
        assert_eq!(gallery[0].prompt(), "a second prompt");
        assert_eq!(gallery[0].data_uri(), "data:image/png;base64,Zmlyc3Q=");
        assert_eq!(gallery[1].data_uri(), "data:image/jpeg;base64,c2Vjb25k");
        assert_eq!(gallery[2].prompt(), "a lighthouse at dusk");
        assert!(!session.is_generating());
        assert_eq!(session.error(), None);

        let calls = transport.calls();
        assert_eq!(
            calls[0].0,
            "https://proxy.example.com/v1beta/models/gemini-3-pro-image-preview:generateContent?key=K"
        );
    }

    #[tokio::test]
    async fn reference_images_go_out_in_order() {
        let transport = FakeTransport::new(two_images());
        let mut session = ready_session();
        session.attach((0..3).map(attachment));

        session.generate(&transport).await;
        let calls = transport.calls();
        let body = &calls[0].1;
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0]["text"], json!("a lighthouse at dusk"));
        // "img0", "img1", "img2"
        assert_eq!(parts[1]["inlineData"]["data"], json!("aW1nMA=="));
        assert_eq!(parts[2]["inlineData"]["data"], json!("aW1nMQ=="));
        assert_eq!(parts[3]["inlineData"]["data"], json!("aW1nMg=="));
    }

    #[tokio::test]
    async fn server_error_message_is_shown() {
        let transport = FakeTransport::new(Reply::Http(
            403,
            r#"{"error":{"message":"Permission denied"}}"#,
        ));
        let mut session = ready_session();

        let outcome = session.generate(&transport).await;
        assert_eq!(outcome, GenerateOutcome::Failed("Permission denied".into()));
        assert_eq!(session.error(), Some("Permission denied"));
        assert!(!session.is_generating());
        assert!(session.gallery().is_empty());
    }

    #[tokio::test]
    async fn no_image_response_is_an_error() {
        let transport = FakeTransport::new(Reply::Json(json!({
            "candidates": [{"content": {"parts": [{"text": "no"}]}}]
        })));
        let mut session = ready_session();

        session.generate(&transport).await;
        assert_eq!(session.error(), Some("No image data found in the response"));
        assert!(!session.is_generating());
    }

    #[tokio::test]
    async fn generate_is_ignored_while_in_flight() {
        let transport = FakeTransport::new(two_images());
        let mut session = ready_session();

        let pending = session.begin_generation().unwrap();
        assert!(session.is_generating());
        assert!(session.begin_generation().is_none());
        assert_eq!(session.generate(&transport).await, GenerateOutcome::Busy);
        assert_eq!(session.error(), None);

        let completed = pending.run(&transport).await;
        session.finish_generation(completed);
        assert!(!session.is_generating());
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn starting_clears_previous_error() {
        let mut session = ready_session();
        session.set_prompt("");
        assert!(session.begin_generation().is_none());
        assert!(session.error().is_some());

        session.set_prompt("ok");
        assert!(session.begin_generation().is_some());
        assert_eq!(session.error(), None);
    }

    #[test]
    fn switching_to_flash_truncates_attachments() {
        let mut session = ready_session();
        assert_eq!(session.attach((0..5).map(attachment)), 5);

        session.set_model(Model::Flash);
        assert_eq!(session.attachments().len(), 1);
        assert_eq!(session.attachments()[0].name, "ref0.png");
        assert_eq!(
            session.error(),
            Some("Switched to the Flash model, reference images limited to 1")
        );
        assert_eq!(session.error_at(Instant::now() + NOTICE_TTL), None);
        assert!(!session.can_attach());
    }

    #[test]
    fn switching_without_overflow_is_quiet() {
        let mut session = ready_session();
        session.attach([attachment(0)]);
        session.set_model(Model::Flash);
        assert_eq!(session.attachments().len(), 1);
        assert_eq!(session.error(), None);
    }

    #[test]
    fn uploads_beyond_cap_are_dropped() {
        let mut session = ready_session();
        session.set_model(Model::Flash);

        assert_eq!(session.attach((0..3).map(attachment)), 1);
        assert_eq!(session.attachments().len(), 1);
        assert_eq!(
            session.error(),
            Some("At most 1 reference images can be attached")
        );

        assert_eq!(session.attach([attachment(9)]), 0);
        assert_eq!(session.attachments()[0].name, "ref0.png");
        assert_eq!(session.error_at(Instant::now() + NOTICE_TTL), None);
    }

    #[test]
    fn detach_frees_a_slot() {
        let mut session = ready_session();
        session.set_model(Model::Flash);
        session.attach([attachment(0)]);
        assert!(session.detach(3).is_none());
        assert_eq!(session.detach(0).unwrap().name, "ref0.png");
        assert!(session.can_attach());
    }

    #[test]
    fn attachment_cap_holds_across_operations() {
        let mut session = ready_session();
        let ops: &[(Option<Model>, usize)] = &[
            (None, 4),
            (Some(Model::Flash), 2),
            (Some(Model::Pro), 20),
            (None, 3),
            (Some(Model::Flash), 0),
            (Some(Model::Pro), 6),
        ];
        for (switch, uploads) in ops {
            if let Some(model) = switch {
                session.set_model(*model);
            }
            session.attach((0..*uploads).map(attachment));
            assert!(session.attachments().len() <= max_images(session.model()));
        }
        assert_eq!(session.attachments().len(), 7);
    }
}
