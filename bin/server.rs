// Cattle Match - Web Server
// REST API with Axum over the deal lifecycle library

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, patch, post},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing::info;

use cattle_match::{
    admin, auth, lifecycle, mailer, notify, store, weighing, AppError, CodeCache, EmailConfig,
    FinalizeRequest, LogMailer, MailSender, NewDemand, NewListing, NewProposal, NewUser,
    SlaughterhouseWeight, User,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    codes: Arc<CodeCache>,
    mailer: Arc<dyn MailSender>,
}

impl AppState {
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

/// Library error carried across the handler boundary
struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::PreconditionFailed(_) => StatusCode::BAD_REQUEST,
            AppError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Storage(_) | AppError::Serde(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ApiResponse {
            success: false,
            data: serde_json::Value::Null,
            error: Some(self.0.to_string()),
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

// ============================================================================
// Auth extractors
// ============================================================================

/// Bearer-token authenticated user
struct AuthUser(User);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError(AppError::forbidden("Missing bearer token")))?
            .to_string();

        let conn = state.conn();
        let user = auth::authenticate(&conn, &token)?;
        Ok(AuthUser(user))
    }
}

/// Authenticated admin
struct AdminUser(User);

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        auth::require_admin(&user)?;
        Ok(AdminUser(user))
    }
}

// ============================================================================
// Auth & 2FA handlers
// ============================================================================

/// POST /auth/register - verified email required
async fn register(
    State(state): State<AppState>,
    Json(payload): Json<NewUser>,
) -> ApiResult<cattle_match::UserPublic> {
    if !state.codes.consume_verified(&payload.email) {
        return Err(ApiError(AppError::forbidden(
            "Email not verified. Request and confirm a verification code first.",
        )));
    }
    let conn = state.conn();
    ok(auth::register(&conn, payload)?)
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

/// POST /auth/token
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<auth::Session> {
    let conn = state.conn();
    ok(auth::login(&conn, &payload.username, &payload.password)?)
}

#[derive(Deserialize)]
struct ResetPasswordRequest {
    email: String,
    new_password: String,
}

/// POST /auth/reset-password - requires a verified code for the email
async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> ApiResult<&'static str> {
    if !state.codes.consume_verified(&payload.email) {
        return Err(ApiError(AppError::forbidden(
            "Email not verified. Request and confirm a verification code first.",
        )));
    }
    let conn = state.conn();
    let user = store::user_by_email(&conn, &payload.email)?.ok_or(AppError::NotFound("User"))?;
    auth::set_password(&conn, &user.username, &payload.new_password)?;
    ok("Password updated")
}

#[derive(Deserialize)]
struct SendCodeRequest {
    email: String,
}

/// POST /api/2fa/send-code
async fn send_code(
    State(state): State<AppState>,
    Json(payload): Json<SendCodeRequest>,
) -> ApiResult<&'static str> {
    let code = state.codes.issue(&payload.email);
    if !mailer::send_verification_code(state.mailer.as_ref(), &payload.email, &code) {
        return Err(ApiError(AppError::ValidationFailed(
            "Could not deliver the verification code".to_string(),
        )));
    }
    ok("Verification code sent")
}

#[derive(Deserialize)]
struct VerifyCodeRequest {
    email: String,
    code: String,
}

/// POST /api/2fa/verify-code
async fn verify_code(
    State(state): State<AppState>,
    Json(payload): Json<VerifyCodeRequest>,
) -> ApiResult<&'static str> {
    if !state.codes.verify(&payload.email, &payload.code) {
        return Err(ApiError(AppError::ValidationFailed(
            "Invalid or expired verification code".to_string(),
        )));
    }
    ok("Email verified")
}

// ============================================================================
// Marketplace handlers
// ============================================================================

/// GET /api/market - all OPEN listings
async fn market(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
) -> ApiResult<Vec<cattle_match::Listing>> {
    let conn = state.conn();
    ok(store::open_listings(&conn)?)
}

#[derive(Serialize)]
struct MyListings {
    supply: Vec<cattle_match::Listing>,
    demand: Vec<cattle_match::DemandRequest>,
}

/// GET /api/my-listings - caller's supply and demand records
async fn my_listings(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<MyListings> {
    let conn = state.conn();
    ok(MyListings {
        supply: store::listings_by_owner(&conn, &user.username)?,
        demand: store::demands_by_owner(&conn, &user.username)?,
    })
}

/// POST /api/listings
async fn create_listing(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<NewListing>,
) -> ApiResult<lifecycle::CreatedWithMatches> {
    let conn = state.conn();
    ok(lifecycle::create_listing(
        &conn,
        state.mailer.as_ref(),
        &user.username,
        payload,
    )?)
}

/// POST /api/demand
async fn create_demand(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<NewDemand>,
) -> ApiResult<lifecycle::CreatedWithMatches> {
    let conn = state.conn();
    ok(lifecycle::create_demand(
        &conn,
        state.mailer.as_ref(),
        &user.username,
        payload,
    )?)
}

// ============================================================================
// Proposal handlers
// ============================================================================

/// POST /api/proposals
async fn create_proposal(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<NewProposal>,
) -> ApiResult<String> {
    let conn = state.conn();
    ok(lifecycle::create_proposal(&conn, &user.username, payload)?)
}

/// GET /api/my-proposals - proposals received on the caller's listings
async fn my_proposals(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Vec<lifecycle::ProposalView>> {
    let conn = state.conn();
    ok(lifecycle::received_proposals(&conn, &user.username)?)
}

/// GET /api/my-sent-proposals
async fn my_sent_proposals(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Vec<lifecycle::ProposalView>> {
    let conn = state.conn();
    ok(lifecycle::sent_proposals(&conn, &user.username)?)
}

/// POST /api/proposals/:id/accept
async fn accept_proposal(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<&'static str> {
    let conn = state.conn();
    lifecycle::accept_proposal(&conn, &user.username, &id)?;
    ok("Proposal accepted")
}

/// POST /api/proposals/:id/reject
async fn reject_proposal(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<&'static str> {
    let conn = state.conn();
    lifecycle::reject_proposal(&conn, &user.username, &id)?;
    ok("Proposal rejected")
}

/// POST /api/pay-reservation/:id
async fn pay_reservation(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<lifecycle::DepositReceipt> {
    let conn = state.conn();
    ok(lifecycle::pay_reservation(&conn, &user.username, &id)?)
}

// ============================================================================
// Weighing handlers
// ============================================================================

/// POST /api/listings/:id/weights
async fn add_weight(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<cattle_match::NewWeightEntry>,
) -> ApiResult<weighing::WeighingProgress> {
    let conn = state.conn();
    ok(weighing::add_weight_entry(&conn, &user.username, &id, payload)?)
}

/// GET /api/listings/:id/weights
async fn get_weights(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<weighing::WeightSummary> {
    let conn = state.conn();
    ok(weighing::weight_summary(&conn, &id)?)
}

/// POST /api/listings/:id/internal-weight
async fn internal_weight(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<weighing::InternalWeightRequest>,
) -> ApiResult<bool> {
    let conn = state.conn();
    ok(weighing::record_internal_weight(
        &conn,
        &user.username,
        &id,
        payload,
    )?)
}

// ============================================================================
// Settlement handlers
// ============================================================================

#[derive(Deserialize)]
struct AdvanceRequest {
    pauta_value: f64,
}

/// POST /api/listings/:id/request-advance
async fn request_advance(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<AdvanceRequest>,
) -> ApiResult<&'static str> {
    let conn = state.conn();
    lifecycle::request_advance(&conn, &user.username, &id, payload.pauta_value)?;
    ok("Advance payment requested")
}

/// POST /api/listings/:id/finalize
async fn finalize_listing(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<FinalizeRequest>,
) -> ApiResult<cattle_match::Transaction> {
    let conn = state.conn();
    ok(lifecycle::finalize_listing(&conn, &user.username, &id, payload)?)
}

/// GET /api/transactions/:id
async fn get_transaction(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<cattle_match::Transaction> {
    let conn = state.conn();
    ok(lifecycle::transaction_for_viewer(&conn, &user.username, &id)?)
}

/// GET /api/transactions/by-listing/:id
async fn get_transaction_by_listing(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<cattle_match::Transaction> {
    let conn = state.conn();
    ok(lifecycle::transaction_for_listing_viewer(
        &conn,
        &user.username,
        &id,
    )?)
}

/// POST /api/transactions/:id/slaughterhouse-weight
async fn slaughterhouse_weight(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<SlaughterhouseWeight>,
) -> ApiResult<cattle_match::Transaction> {
    let conn = state.conn();
    ok(lifecycle::submit_slaughterhouse_weight(
        &conn,
        &user.username,
        &id,
        payload,
    )?)
}

/// POST /api/transactions/:id/pay-final
async fn pay_final(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<cattle_match::Transaction> {
    let conn = state.conn();
    ok(lifecycle::pay_final(&conn, &user.username, &id)?)
}

/// POST /api/transactions/:id/confirm-payment
async fn confirm_payment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<lifecycle::ConfirmOutcome> {
    let conn = state.conn();
    ok(lifecycle::confirm_payment(&conn, &user.username, &id)?)
}

// ============================================================================
// Notification handlers
// ============================================================================

/// GET /api/notifications
async fn get_notifications(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Vec<cattle_match::Notification>> {
    let conn = state.conn();
    ok(notify::notifications_for(&conn, &user.username)?)
}

/// POST /api/notifications/:id/read
async fn mark_notification_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<&'static str> {
    let conn = state.conn();
    if !notify::mark_read(&conn, &user.username, &id)? {
        return Err(ApiError(AppError::NotFound("Notification")));
    }
    ok("Notification marked as read")
}

// ============================================================================
// Reference & admin handlers
// ============================================================================

/// GET /api/system/references - breeds and custom cities for the forms
async fn get_references(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
) -> ApiResult<admin::References> {
    let conn = state.conn();
    ok(admin::load_references(&conn)?)
}

#[derive(Deserialize)]
struct BreedRequest {
    name: String,
}

/// POST /api/admin/breed
async fn add_breed(
    State(state): State<AppState>,
    AdminUser(user): AdminUser,
    Json(payload): Json<BreedRequest>,
) -> ApiResult<admin::References> {
    let conn = state.conn();
    ok(admin::add_breed(&conn, &user, &payload.name)?)
}

/// DELETE /api/admin/breed/:name
async fn remove_breed(
    State(state): State<AppState>,
    AdminUser(user): AdminUser,
    Path(name): Path<String>,
) -> ApiResult<admin::References> {
    let conn = state.conn();
    ok(admin::remove_breed(&conn, &user, &name)?)
}

#[derive(Deserialize)]
struct CityRequest {
    state: String,
    name: String,
}

/// POST /api/admin/location/city
async fn add_city(
    State(state): State<AppState>,
    AdminUser(user): AdminUser,
    Json(payload): Json<CityRequest>,
) -> ApiResult<admin::References> {
    let conn = state.conn();
    ok(admin::add_city(&conn, &user, &payload.state, &payload.name)?)
}

/// DELETE /api/admin/location/city/:state/:name
async fn remove_city(
    State(state): State<AppState>,
    AdminUser(user): AdminUser,
    Path((city_state, name)): Path<(String, String)>,
) -> ApiResult<admin::References> {
    let conn = state.conn();
    ok(admin::remove_city(&conn, &user, &city_state, &name)?)
}

/// GET /api/admin/stats
async fn admin_stats(
    State(state): State<AppState>,
    AdminUser(user): AdminUser,
) -> ApiResult<admin::PlatformStats> {
    let conn = state.conn();
    ok(admin::platform_stats(&conn, &user)?)
}

/// GET /api/admin/users
async fn admin_users(
    State(state): State<AppState>,
    AdminUser(user): AdminUser,
) -> ApiResult<Vec<cattle_match::UserPublic>> {
    let conn = state.conn();
    ok(admin::list_users(&conn, &user)?)
}

/// PATCH /api/admin/user/:username/toggle-status
async fn toggle_user_status(
    State(state): State<AppState>,
    AdminUser(user): AdminUser,
    Path(username): Path<String>,
) -> ApiResult<&'static str> {
    let conn = state.conn();
    let target = store::get_user(&conn, &username)?.ok_or(AppError::NotFound("User"))?;
    admin::set_user_active(&conn, &user, &username, !target.is_active)?;
    ok("User status updated")
}

/// DELETE /api/admin/user/:username
async fn delete_user(
    State(state): State<AppState>,
    AdminUser(user): AdminUser,
    Path(username): Path<String>,
) -> ApiResult<&'static str> {
    let conn = state.conn();
    admin::remove_user(&conn, &user, &username)?;
    ok("User deleted")
}

/// GET /api/admin/listings
async fn admin_listings(
    State(state): State<AppState>,
    AdminUser(user): AdminUser,
) -> ApiResult<Vec<cattle_match::Listing>> {
    let conn = state.conn();
    ok(admin::all_listings(&conn, &user)?)
}

/// DELETE /api/admin/listing/:type/:id - type is "supply" or "demand"
async fn admin_delete_listing(
    State(state): State<AppState>,
    AdminUser(user): AdminUser,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<&'static str> {
    let conn = state.conn();
    match kind.as_str() {
        "supply" => admin::remove_listing(&conn, &user, &id)?,
        "demand" => admin::remove_demand(&conn, &user, &id)?,
        _ => {
            return Err(ApiError(AppError::ValidationFailed(
                "Listing type must be 'supply' or 'demand'".to_string(),
            )))
        }
    }
    ok("Listing deleted")
}

/// GET /api/admin/email-config
async fn get_email_config(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> ApiResult<EmailConfig> {
    let conn = state.conn();
    ok(mailer::load_email_config(&conn)?)
}

/// PUT /api/admin/email-config
async fn set_email_config(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Json(payload): Json<EmailConfig>,
) -> ApiResult<&'static str> {
    let conn = state.conn();
    mailer::save_email_config(&conn, &payload)?;
    ok("Email configuration saved")
}

/// GET /api/health
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("🐂 Cattle Match - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = std::env::var("CATTLE_DB").unwrap_or_else(|_| "cattle.db".to_string());
    let conn = Connection::open(&db_path)?;
    store::setup_database(&conn)?;
    println!("✓ Database ready: {}", db_path);

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        codes: Arc::new(CodeCache::new()),
        mailer: Arc::new(LogMailer),
    };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/market", get(market))
        .route("/my-listings", get(my_listings))
        .route("/listings", post(create_listing))
        .route("/demand", post(create_demand))
        .route("/proposals", post(create_proposal))
        .route("/my-proposals", get(my_proposals))
        .route("/my-sent-proposals", get(my_sent_proposals))
        .route("/proposals/:id/accept", post(accept_proposal))
        .route("/proposals/:id/reject", post(reject_proposal))
        .route("/pay-reservation/:id", post(pay_reservation))
        .route("/listings/:id/weights", post(add_weight).get(get_weights))
        .route("/listings/:id/internal-weight", post(internal_weight))
        .route("/listings/:id/request-advance", post(request_advance))
        .route("/listings/:id/finalize", post(finalize_listing))
        .route("/transactions/:id", get(get_transaction))
        .route("/transactions/by-listing/:id", get(get_transaction_by_listing))
        .route(
            "/transactions/:id/slaughterhouse-weight",
            post(slaughterhouse_weight),
        )
        .route("/transactions/:id/pay-final", post(pay_final))
        .route("/transactions/:id/confirm-payment", post(confirm_payment))
        .route("/notifications", get(get_notifications))
        .route("/notifications/:id/read", post(mark_notification_read))
        .route("/2fa/send-code", post(send_code))
        .route("/2fa/verify-code", post(verify_code))
        .route("/system/references", get(get_references))
        .route("/admin/breed", post(add_breed))
        .route("/admin/breed/:name", delete(remove_breed))
        .route("/admin/location/city", post(add_city))
        .route("/admin/location/city/:state/:name", delete(remove_city))
        .route("/admin/stats", get(admin_stats))
        .route("/admin/users", get(admin_users))
        .route("/admin/user/:username/toggle-status", patch(toggle_user_status))
        .route("/admin/user/:username", delete(delete_user))
        .route("/admin/listings", get(admin_listings))
        .route("/admin/listing/:type/:id", delete(admin_delete_listing))
        .route(
            "/admin/email-config",
            get(get_email_config).put(set_email_config),
        )
        .with_state(state.clone());

    let auth_routes = Router::new()
        .route("/register", post(register))
        .route("/token", post(login))
        .route("/reset-password", post(reset_password))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .nest("/auth", auth_routes)
        .layer(CorsLayer::permissive());

    let addr = "0.0.0.0:3000";
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!("\n🚀 Server running on http://localhost:3000");
    println!("   API: http://localhost:3000/api/market");
    println!("\n   Press Ctrl+C to stop\n");
    info!(addr, "server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
