//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a notes screen connection.
//! Each connection owns one `StudyApp`; view changes and session notifications
//! are pushed from background tasks, and every outgoing message goes through a
//! single writer task.

use crate::{
    adapters::PasswordAuth,
    web::{
        middleware::session_id_from_headers,
        protocol::{ClientMessage, ServerMessage, ViewPayload},
        state::{AppState, PendingUpload},
    },
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use study_notes_core::{
    CatalogError, CatalogView, Category, DeleteOutcome, DeleteRequest, FavoriteToggle, ScreenError, SessionEventStream,
    SignUpProfile, StudyApp,
};
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type Outbox = mpsc::UnboundedSender<ServerMessage>;
type Screen = Arc<Mutex<StudyApp>>;
type Replies = Vec<ServerMessage>;

type SubmissionFuture<'a> =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Replies, ScreenError>> + Send + 'a>>;

/// The handler for upgrading HTTP requests to WebSocket connections.
///
/// Anonymous visitors may connect; a `session` cookie, if present, is restored.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let session_id = session_id_from_headers(&headers);
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, session_id))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, session_id: Option<String>) {
    info!(restoring = session_id.is_some(), "New screen connection established");

    let (sink, mut receiver) = socket.split();
    let (outbox, outbox_rx) = mpsc::unbounded_channel();
    spawn_writer(sink, outbox_rx);

    // --- 1. Initialization Phase ---
    let auth = Arc::new(PasswordAuth::new(app_state.accounts.clone(), session_id));
    let mut app = StudyApp::new(auth, app_state.catalog_ports(), app_state.features());
    let views = app.catalog().subscribe();
    let session_events = app.gate().session_changes();
    for notice in app.start().await {
        warn!(error = %notice, "Screen started with a failure");
        let _ = outbox.send(ServerMessage::from(&notice));
    }
    let screen: Screen = Arc::new(Mutex::new(app));

    let token = CancellationToken::new();
    let view_task = spawn_view_forwarder(views, outbox.clone(), token.clone());
    let session_task = spawn_session_listener(session_events, screen.clone(), outbox.clone(), token.clone());

    // --- 2. Main Message Loop ---
    let mut connection = Connection::new(screen, outbox, app_state.config.max_upload_bytes);
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => connection.handle_text(text.as_str()).await,
            Ok(Message::Binary(data)) => connection.handle_binary(&data),
            Ok(Message::Close(_)) => {
                info!("Client sent close message.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive failed: {e}");
                break;
            }
        }
    }

    // --- 3. Cleanup ---
    token.cancel();
    let _ = view_task.await;
    let _ = session_task.await;
    // A submission already sent finishes on its own. The writer stops once the
    // last outbox handle is gone.
    drop(connection);
    info!("Screen connection closed.");
}

/// Serializes queued messages onto the socket until the outbox closes or the
/// socket fails.
fn spawn_writer(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbox: mpsc::UnboundedReceiver<ServerMessage>,
) {
    tokio::spawn(async move {
        while let Some(msg) = outbox.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize server message: {e}");
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });
}

/// Pushes the current view, then every subsequent change, until cancelled.
fn spawn_view_forwarder(
    mut views: watch::Receiver<CatalogView>,
    outbox: Outbox,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let payload = ViewPayload::from(&*views.borrow_and_update());
            if outbox.send(ServerMessage::View(payload)).is_err() {
                break;
            }
            tokio::select! {
                _ = token.cancelled() => break,
                changed = views.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Applies sign-in, sign-out and expiry notifications to the screen.
fn spawn_session_listener(
    mut events: SessionEventStream,
    screen: Screen,
    outbox: Outbox,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = token.cancelled() => break,
                event = events.next() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            info!(?event, "Session notification received");
            let result = screen.lock().await.handle_session_event(event).await;
            if let Err(e) = result {
                let _ = outbox.send(ServerMessage::from(&e));
            }
        }
    })
}

//=========================================================================================
// Connection (Receive Side of One Socket)
//=========================================================================================

/// Filter input that arrived while a submission held the screen. The latest
/// values are applied as soon as the submission finishes.
#[derive(Default)]
struct HeldInput {
    holding: bool,
    category: Option<Category>,
    search: Option<String>,
}

struct Connection {
    screen: Screen,
    outbox: Outbox,
    upload_limit: usize,
    pending_upload: Option<PendingUpload>,
    in_flight: Option<JoinHandle<()>>,
    held: Arc<Mutex<HeldInput>>,
}

/// Messages that take the screen for a remote call. Only one of them runs at a
/// time; the rest are refused with `busy` while a submission is in flight.
fn needs_idle_screen(msg: &ClientMessage) -> bool {
    matches!(
        msg,
        ClientMessage::SignIn { .. }
            | ClientMessage::SignUp { .. }
            | ClientMessage::SignOut
            | ClientMessage::Refresh
            | ClientMessage::ToggleFavorite { .. }
            | ClientMessage::FinishUpload
            | ClientMessage::DeleteNote { .. }
    )
}

/// The reply to a change, followed by an error if the list reload after it failed.
fn with_refresh(reply: ServerMessage, refresh: Result<(), CatalogError>) -> Replies {
    match refresh {
        Ok(()) => vec![reply],
        Err(e) => {
            warn!(error = %e, "Note list is stale after a change");
            vec![reply, ServerMessage::from(&ScreenError::from(e))]
        }
    }
}

impl Connection {
    fn new(screen: Screen, outbox: Outbox, upload_limit: usize) -> Self {
        Self {
            screen,
            outbox,
            upload_limit,
            pending_upload: None,
            in_flight: None,
            held: Arc::new(Mutex::new(HeldInput::default())),
        }
    }

    fn send(&self, msg: ServerMessage) {
        let _ = self.outbox.send(msg);
    }

    fn is_busy(&self) -> bool {
        self.in_flight.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(client_msg) => self.handle_client_message(client_msg).await,
            Err(e) => {
                warn!("Failed to deserialize client message: {}", e);
                self.send(ServerMessage::error("protocol", e.to_string()));
            }
        }
    }

    fn handle_binary(&mut self, data: &[u8]) {
        let Some(upload) = self.pending_upload.as_mut() else {
            warn!(len = data.len(), "Binary frame without an announced upload");
            return;
        };
        if let Err(limit) = upload.push(data, self.upload_limit) {
            warn!(limit, "Upload exceeded the size limit");
            self.pending_upload = None;
            self.send(ServerMessage::error("validation", format!("Upload exceeds {limit} bytes")));
        }
    }

    /// Helper function to handle the logic for different `ClientMessage` variants.
    async fn handle_client_message(&mut self, client_msg: ClientMessage) {
        if needs_idle_screen(&client_msg) && self.is_busy() {
            self.send(ServerMessage::error("busy", "Another submission is in progress"));
            return;
        }

        match client_msg {
            ClientMessage::SignIn { email, password } => {
                self.submit(move |app| {
                    Box::pin(async move {
                        app.sign_in(&email, &password).await?;
                        Ok::<Replies, ScreenError>(Vec::new())
                    })
                })
                .await;
            }
            ClientMessage::SignUp {
                email,
                password,
                display_name,
            } => {
                self.submit(move |app| {
                    Box::pin(async move {
                        let profile = SignUpProfile { display_name };
                        let pending = app.sign_up(&email, &password, &profile).await?;
                        Ok::<Replies, ScreenError>(vec![ServerMessage::SignUpPending { email: pending.email }])
                    })
                })
                .await;
            }
            ClientMessage::SignOut => {
                let result = self.screen.lock().await.sign_out().await;
                if let Err(e) = result {
                    self.send(ServerMessage::from(&e));
                }
            }
            ClientMessage::SelectCategory { category } => {
                let category = match category.parse::<Category>() {
                    Ok(category) => category,
                    Err(e) => {
                        self.send(ServerMessage::error("validation", e.to_string()));
                        return;
                    }
                };
                {
                    let mut held = self.held.lock().await;
                    if held.holding {
                        held.category = Some(category);
                        return;
                    }
                }
                let result = self.screen.lock().await.select_category(category);
                if let Err(e) = result {
                    self.send(ServerMessage::from(&e));
                }
            }
            ClientMessage::Search { term } => {
                {
                    let mut held = self.held.lock().await;
                    if held.holding {
                        held.search = Some(term);
                        return;
                    }
                }
                self.screen.lock().await.search(term);
            }
            ClientMessage::Refresh => {
                let result = self.screen.lock().await.refresh().await;
                if let Err(e) = result {
                    self.send(ServerMessage::from(&e));
                }
            }
            ClientMessage::ToggleFavorite { note_id } => {
                let result = self.screen.lock().await.toggle_favorite(note_id).await;
                let msg = match result {
                    Ok(toggle) => ServerMessage::FavoriteToggled {
                        note_id,
                        is_favorite: toggle == FavoriteToggle::Added,
                    },
                    Err(e) => ServerMessage::from(&e),
                };
                self.send(msg);
            }
            ClientMessage::BeginUpload {
                title,
                subject,
                file_name,
                content_type,
            } => {
                if self.pending_upload.is_some() {
                    warn!("Replacing an unfinished upload");
                }
                let msg = ServerMessage::UploadStarted {
                    file_name: file_name.clone(),
                };
                self.pending_upload = Some(PendingUpload::new(title, subject, file_name, content_type));
                self.send(msg);
            }
            ClientMessage::CancelUpload => {
                self.pending_upload = None;
            }
            ClientMessage::FinishUpload => {
                let Some(upload) = self.pending_upload.take() else {
                    self.send(ServerMessage::error("validation", "No upload in progress"));
                    return;
                };
                info!(file_name = %upload.file_name, size = upload.received(), "Submitting upload");
                let draft = upload.into_draft();
                self.submit(move |app| {
                    Box::pin(async move {
                        let uploaded = app.upload(draft).await?;
                        let reply = ServerMessage::Uploaded {
                            note_id: uploaded.value.id,
                            title: uploaded.value.title,
                        };
                        Ok::<Replies, ScreenError>(with_refresh(reply, uploaded.refresh))
                    })
                })
                .await;
            }
            ClientMessage::DeleteNote { id, confirmed } => {
                self.submit(move |app| {
                    Box::pin(async move {
                        let file_url = app
                            .catalog()
                            .note(id)
                            .map(|note| note.file_url.clone())
                            .ok_or(CatalogError::UnknownNote(id))?;
                        let deleted = app
                            .delete_note(DeleteRequest {
                                id,
                                file_url,
                                confirmed,
                            })
                            .await?;
                        let reply = match deleted.value {
                            DeleteOutcome::Deleted => ServerMessage::Deleted { note_id: id },
                            DeleteOutcome::Cancelled => ServerMessage::DeleteCancelled { note_id: id },
                        };
                        Ok::<Replies, ScreenError>(with_refresh(reply, deleted.refresh))
                    })
                })
                .await;
            }
        }
    }

    /// Runs one submission against the screen in a background task so the
    /// receive loop keeps reading frames.
    async fn submit<F>(&mut self, action: F)
    where
        F: for<'a> FnOnce(&'a mut StudyApp) -> SubmissionFuture<'a> + Send + 'static,
    {
        self.held.lock().await.holding = true;
        self.in_flight = Some(spawn_submission(
            self.screen.clone(),
            self.held.clone(),
            self.outbox.clone(),
            action,
        ));
    }
}

fn spawn_submission<F>(screen: Screen, held: Arc<Mutex<HeldInput>>, outbox: Outbox, action: F) -> JoinHandle<()>
where
    F: for<'a> FnOnce(&'a mut StudyApp) -> SubmissionFuture<'a> + Send + 'static,
{
    tokio::spawn(async move {
        let mut app = screen.lock().await;
        let result = action(&mut *app).await;
        release_held_input(&mut app, &held, &outbox).await;
        drop(app);
        match result {
            Ok(replies) => {
                for msg in replies {
                    let _ = outbox.send(msg);
                }
            }
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Submission failed");
                let _ = outbox.send(ServerMessage::from(&e));
            }
        }
    })
}

/// Applies the filter input held during a submission and stops holding.
async fn release_held_input(app: &mut StudyApp, held: &Mutex<HeldInput>, outbox: &Outbox) {
    let input = std::mem::take(&mut *held.lock().await);
    if let Some(category) = input.category {
        if let Err(e) = app.select_category(category) {
            let _ = outbox.send(ServerMessage::from(&e));
        }
    }
    if let Some(term) = input.search {
        app.search(term);
    }
}
