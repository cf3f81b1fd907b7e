//! Fakes shared by the unit tests: an in-memory post service, a recording surface,
//! a scripted identity provider, and a signed in-process ledger server.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex as StdMutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post as route_post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration as ChronoDuration, Utc};
use ed25519_dalek::{Signer, SigningKey};
use shared::{
    domain::{PostId, Principal},
    error::{ApiError, ErrorCode},
    protocol::{
        CreatePostRequest, LikePostResponse, ListPostsQuery, Post, StatusResponse,
        PRINCIPAL_HEADER, SIGNATURE_HEADER,
    },
};
use tokio::{net::TcpListener, sync::Notify};

use crate::{
    error::{ClientError, RemoteFailure},
    identity::{Identity, IdentityProvider, LoginOptions},
    service::PostService,
    surface::{
        AuthSurface, ComposerSurface, LikeSurface, Navigator, Notice, PostCard, PostListSurface,
        Route,
    },
};

pub fn post(id: u64, timestamp: u64, content: &str, likes: u64) -> Post {
    Post {
        id: PostId(id),
        author: Principal::new("2vxsx-fae-author"),
        content: content.to_string(),
        timestamp,
        likes,
    }
}

pub fn identity(name: &str) -> Identity {
    Identity::new(
        Principal::new(format!("{name}-principal")),
        format!("delegation-{name}"),
        Utc::now() + ChronoDuration::hours(1),
    )
}

fn transport_error(operation: &'static str) -> ClientError {
    ClientError::remote(operation, RemoteFailure::Transport("connection refused".into()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeBehaviour {
    Accept,
    Reject,
    Fail,
}

/// In-memory post service with scripted failures and call counters.
pub struct FakePostService {
    posts: StdMutex<Vec<Post>>,
    next_id: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub like_calls: AtomicUsize,
    pub fail_list: AtomicBool,
    pub fail_create: AtomicBool,
    pub hold_create: AtomicBool,
    pub hold_like: AtomicBool,
    pub release: Notify,
    pub entered: Notify,
    like_behaviour: StdMutex<LikeBehaviour>,
}

impl FakePostService {
    pub fn new(posts: Vec<Post>) -> Arc<Self> {
        let next_id = posts.iter().map(|p| p.id.0 as usize).max().unwrap_or(0) + 1;
        Arc::new(Self {
            posts: StdMutex::new(posts),
            next_id: AtomicUsize::new(next_id),
            list_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            like_calls: AtomicUsize::new(0),
            fail_list: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            hold_create: AtomicBool::new(false),
            hold_like: AtomicBool::new(false),
            release: Notify::new(),
            entered: Notify::new(),
            like_behaviour: StdMutex::new(LikeBehaviour::Accept),
        })
    }

    pub fn set_like_behaviour(&self, behaviour: LikeBehaviour) {
        *self.like_behaviour.lock().expect("like behaviour") = behaviour;
    }

    pub fn calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
            + self.create_calls.load(Ordering::SeqCst)
            + self.like_calls.load(Ordering::SeqCst)
    }

    pub fn stored_likes(&self, id: PostId) -> Option<u64> {
        self.posts
            .lock()
            .expect("posts")
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.likes)
    }
}

#[async_trait]
impl PostService for FakePostService {
    async fn list_posts(&self, limit: u32, offset: u32) -> Result<Vec<Post>, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(transport_error("list_posts"));
        }
        let posts = self.posts.lock().expect("posts");
        Ok(posts
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn create_post(&self, content: &str) -> Result<Post, ClientError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_create.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(transport_error("create_post"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as u64;
        let created = post(id, 1_000 + id, content, 0);
        self.posts.lock().expect("posts").push(created.clone());
        Ok(created)
    }

    async fn like_post(&self, id: PostId) -> Result<bool, ClientError> {
        self.like_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_like.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        let behaviour = *self.like_behaviour.lock().expect("like behaviour");
        match behaviour {
            LikeBehaviour::Fail => Err(transport_error("like_post")),
            LikeBehaviour::Reject => Ok(false),
            LikeBehaviour::Accept => {
                let mut posts = self.posts.lock().expect("posts");
                match posts.iter_mut().find(|p| p.id == id) {
                    Some(stored) => {
                        stored.likes += 1;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
        }
    }

    async fn get_post(&self, id: PostId) -> Result<Option<Post>, ClientError> {
        Ok(self
            .posts
            .lock()
            .expect("posts")
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListView {
    Blank,
    Loading,
    Empty(String),
    Error(String),
    Rendered(Vec<PostCard>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonView {
    pub enabled: bool,
    pub liked: bool,
    pub count: Option<u64>,
}

impl Default for ButtonView {
    fn default() -> Self {
        Self {
            enabled: true,
            liked: false,
            count: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthView {
    Unknown,
    SignedIn(Principal),
    SignedOut,
}

/// Records everything the controllers do to the screen.
pub struct RecordingSurface {
    pub list: StdMutex<ListView>,
    pub list_history: StdMutex<Vec<ListView>>,
    pub submit_state: StdMutex<(bool, String)>,
    pub submit_history: StdMutex<Vec<(bool, String)>>,
    pub input_cleared: AtomicUsize,
    pub notices: StdMutex<Vec<Notice>>,
    pub buttons: StdMutex<HashMap<PostId, ButtonView>>,
    pub auth: StdMutex<AuthView>,
}

impl RecordingSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            list: StdMutex::new(ListView::Blank),
            list_history: StdMutex::new(Vec::new()),
            submit_state: StdMutex::new((true, "Post".into())),
            submit_history: StdMutex::new(Vec::new()),
            input_cleared: AtomicUsize::new(0),
            notices: StdMutex::new(Vec::new()),
            buttons: StdMutex::new(HashMap::new()),
            auth: StdMutex::new(AuthView::Unknown),
        })
    }

    pub fn list(&self) -> ListView {
        self.list.lock().expect("list").clone()
    }

    pub fn rendered(&self) -> Vec<PostCard> {
        match self.list() {
            ListView::Rendered(cards) => cards,
            other => panic!("expected rendered list, got {other:?}"),
        }
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().expect("notices").clone()
    }

    pub fn button(&self, id: PostId) -> ButtonView {
        self.buttons
            .lock()
            .expect("buttons")
            .get(&id)
            .copied()
            .unwrap_or_default()
    }

    pub fn submit_state(&self) -> (bool, String) {
        self.submit_state.lock().expect("submit").clone()
    }

    fn set_list(&self, view: ListView) {
        self.list_history.lock().expect("history").push(view.clone());
        *self.list.lock().expect("list") = view;
    }

    fn update_button(&self, id: PostId, update: impl FnOnce(&mut ButtonView)) {
        let mut buttons = self.buttons.lock().expect("buttons");
        update(buttons.entry(id).or_default());
    }
}

impl PostListSurface for RecordingSurface {
    fn show_loading(&self) {
        self.set_list(ListView::Loading);
    }

    fn show_empty(&self, message: &str) {
        self.set_list(ListView::Empty(message.to_string()));
    }

    fn show_error(&self, message: &str) {
        self.set_list(ListView::Error(message.to_string()));
    }

    fn render(&self, cards: &[PostCard]) {
        self.buttons.lock().expect("buttons").clear();
        self.set_list(ListView::Rendered(cards.to_vec()));
    }
}

impl ComposerSurface for RecordingSurface {
    fn set_submit_state(&self, enabled: bool, label: &str) {
        self.submit_history
            .lock()
            .expect("submit history")
            .push((enabled, label.to_string()));
        *self.submit_state.lock().expect("submit") = (enabled, label.to_string());
    }

    fn clear_input(&self) {
        self.input_cleared.fetch_add(1, Ordering::SeqCst);
    }

    fn notify(&self, notice: Notice) {
        self.notices.lock().expect("notices").push(notice);
    }
}

impl LikeSurface for RecordingSurface {
    fn set_like_enabled(&self, post_id: PostId, enabled: bool) {
        self.update_button(post_id, |button| button.enabled = enabled);
    }

    fn set_liked(&self, post_id: PostId, liked: bool) {
        self.update_button(post_id, |button| button.liked = liked);
    }

    fn set_like_count(&self, post_id: PostId, count: u64) {
        self.update_button(post_id, |button| button.count = Some(count));
    }

    fn notify(&self, notice: Notice) {
        self.notices.lock().expect("notices").push(notice);
    }
}

impl AuthSurface for RecordingSurface {
    fn show_signed_in(&self, principal: &Principal) {
        *self.auth.lock().expect("auth") = AuthView::SignedIn(principal.clone());
    }

    fn show_signed_out(&self) {
        *self.auth.lock().expect("auth") = AuthView::SignedOut;
    }

    fn notify(&self, notice: Notice) {
        self.notices.lock().expect("notices").push(notice);
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    pub routes: StdMutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().expect("routes").clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, route: Route) {
        self.routes.lock().expect("routes").push(route);
    }
}

/// Identity provider whose outcomes are set by the test.
pub struct FakeIdentityProvider {
    pub stored: StdMutex<Option<Identity>>,
    pub login_result: StdMutex<Option<Identity>>,
    pub fail_logout: AtomicBool,
    pub login_calls: AtomicUsize,
    pub hold_login: AtomicBool,
    pub release: Notify,
    pub entered: Notify,
}

impl FakeIdentityProvider {
    pub fn signed_out() -> Arc<Self> {
        Arc::new(Self {
            stored: StdMutex::new(None),
            login_result: StdMutex::new(None),
            fail_logout: AtomicBool::new(false),
            login_calls: AtomicUsize::new(0),
            hold_login: AtomicBool::new(false),
            release: Notify::new(),
            entered: Notify::new(),
        })
    }

    pub fn signed_in(identity: Identity) -> Arc<Self> {
        let provider = Self::signed_out();
        *provider.stored.lock().expect("stored") = Some(identity);
        provider
    }

    pub fn will_login_as(&self, identity: Identity) {
        *self.login_result.lock().expect("login result") = Some(identity);
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn is_authenticated(&self) -> bool {
        self.stored.lock().expect("stored").is_some()
    }

    async fn identity(&self) -> Option<Identity> {
        self.stored.lock().expect("stored").clone()
    }

    async fn login(&self, _options: &LoginOptions) -> Result<Identity, ClientError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_login.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        let result = self.login_result.lock().expect("login result").clone();
        match result {
            Some(identity) => {
                *self.stored.lock().expect("stored") = Some(identity.clone());
                Ok(identity)
            }
            None => Err(ClientError::Auth("user closed the login window".into())),
        }
    }

    async fn logout(&self) -> Result<(), ClientError> {
        self.stored.lock().expect("stored").take();
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(ClientError::Auth("provider unreachable".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
pub struct LedgerOptions {
    pub sign_responses: bool,
    pub like_delay: Option<Duration>,
    pub fail_status: bool,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            sign_responses: true,
            like_delay: None,
            fail_status: false,
        }
    }
}

#[derive(Clone)]
struct LedgerState {
    key: Arc<SigningKey>,
    options: LedgerOptions,
    posts: Arc<StdMutex<Vec<Post>>>,
    status_hits: Arc<AtomicUsize>,
    seen_principals: Arc<StdMutex<Vec<String>>>,
}

pub struct TestLedger {
    pub url: String,
    pub signing_key: Arc<SigningKey>,
    pub status_hits: Arc<AtomicUsize>,
    pub seen_principals: Arc<StdMutex<Vec<String>>>,
}

impl TestLedger {
    pub fn root_key_b64(&self) -> String {
        STANDARD.encode(self.signing_key.verifying_key().as_bytes())
    }
}

fn signed_json<T: serde::Serialize>(state: &LedgerState, status: StatusCode, value: &T) -> Response {
    let body = serde_json::to_vec(value).expect("encode body");
    let mut builder = axum::http::Response::builder()
        .status(status)
        .header("content-type", "application/json");
    if state.options.sign_responses && status.is_success() {
        let signature = STANDARD.encode(state.key.sign(&body).to_bytes());
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(body)).expect("response")
}

fn authorize(state: &LedgerState, headers: &HeaderMap) -> Result<String, Response> {
    let principal = headers
        .get(PRINCIPAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned);
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| !token.is_empty());
    match principal {
        Some(principal) if bearer => {
            state
                .seen_principals
                .lock()
                .expect("principals")
                .push(principal.clone());
            Ok(principal)
        }
        _ => Err(signed_json(
            state,
            StatusCode::UNAUTHORIZED,
            &ApiError::new(ErrorCode::Unauthorized, "unsigned call"),
        )),
    }
}

async fn handle_status(State(state): State<LedgerState>) -> Response {
    state.status_hits.fetch_add(1, Ordering::SeqCst);
    if state.options.fail_status {
        return signed_json(
            &state,
            StatusCode::SERVICE_UNAVAILABLE,
            &ApiError::new(ErrorCode::Internal, "replica is starting"),
        );
    }
    let body = StatusResponse {
        root_key: STANDARD.encode(state.key.verifying_key().as_bytes()),
    };
    signed_json(&state, StatusCode::OK, &body)
}

async fn handle_list(
    State(state): State<LedgerState>,
    headers: HeaderMap,
    Query(query): Query<ListPostsQuery>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }
    let posts: Vec<Post> = state
        .posts
        .lock()
        .expect("posts")
        .iter()
        .skip(query.offset as usize)
        .take(query.limit as usize)
        .cloned()
        .collect();
    signed_json(&state, StatusCode::OK, &posts)
}

async fn handle_create(
    State(state): State<LedgerState>,
    headers: HeaderMap,
    Json(request): Json<CreatePostRequest>,
) -> Response {
    let principal = match authorize(&state, &headers) {
        Ok(principal) => principal,
        Err(rejection) => return rejection,
    };
    let created = {
        let mut posts = state.posts.lock().expect("posts");
        let id = posts.len() as u64 + 1;
        let created = Post {
            id: PostId(id),
            author: Principal::new(principal),
            content: request.content,
            timestamp: 1_700_000_000_000_000_000 + id,
            likes: 0,
        };
        posts.push(created.clone());
        created
    };
    signed_json(&state, StatusCode::OK, &created)
}

async fn handle_like(
    State(state): State<LedgerState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }
    if let Some(delay) = state.options.like_delay {
        tokio::time::sleep(delay).await;
    }
    let liked = {
        let mut posts = state.posts.lock().expect("posts");
        match posts.iter_mut().find(|p| p.id == PostId(id)) {
            Some(stored) => {
                stored.likes += 1;
                true
            }
            None => false,
        }
    };
    signed_json(&state, StatusCode::OK, &LikePostResponse { liked })
}

async fn handle_get(
    State(state): State<LedgerState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }
    let found = state
        .posts
        .lock()
        .expect("posts")
        .iter()
        .find(|p| p.id == PostId(id))
        .cloned();
    match found {
        Some(post) => signed_json(&state, StatusCode::OK, &post),
        None => signed_json(
            &state,
            StatusCode::NOT_FOUND,
            &ApiError::new(ErrorCode::NotFound, format!("post {id} not found")),
        ),
    }
}

pub async fn spawn_ledger(options: LedgerOptions) -> TestLedger {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let key = Arc::new(SigningKey::from_bytes(&[42u8; 32]));
    let state = LedgerState {
        key: Arc::clone(&key),
        options,
        posts: Arc::new(StdMutex::new(Vec::new())),
        status_hits: Arc::new(AtomicUsize::new(0)),
        seen_principals: Arc::new(StdMutex::new(Vec::new())),
    };
    let ledger = TestLedger {
        url: format!("http://{addr}"),
        signing_key: key,
        status_hits: Arc::clone(&state.status_hits),
        seen_principals: Arc::clone(&state.seen_principals),
    };
    let app = Router::new()
        .route("/api/v2/status", get(handle_status))
        .route("/posts", get(handle_list).post(handle_create))
        .route("/posts/:id", get(handle_get))
        .route("/posts/:id/like", route_post(handle_like))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    ledger
}
