//! Authentication route handlers.
//!
//! Email and password login. Signing in stores the user in the session and
//! folds the visitor's anonymous cart into the user's cart.

use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{LocalCartCookie, clear_current_user, set_current_user};
use crate::models::{CurrentUser, User};
use crate::services::cart::{CartContext, Caller, MergeOutcome};
use crate::state::AppState;

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

/// Handle login form submission.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    mut cookie: LocalCartCookie,
    Form(form): Form<LoginForm>,
) -> Result<impl IntoResponse> {
    let user = state
        .auth()
        .login_with_password(&form.email, &form.password)
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "Login failed"))?;

    sign_in(&state, &session, &mut cookie, &user).await?;
    Ok((cookie, Redirect::to("/")))
}

/// Handle registration form submission; the new user is signed in.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    mut cookie: LocalCartCookie,
    Form(form): Form<RegisterForm>,
) -> Result<impl IntoResponse> {
    if form.password != form.password_confirm {
        return Err(AppError::BadRequest("Passwords do not match".to_string()));
    }

    let user = state
        .auth()
        .register_with_password(&form.email, &form.password)
        .await?;

    sign_in(&state, &session, &mut cookie, &user).await?;
    Ok((cookie, Redirect::to("/")))
}

/// Handle logout.
#[instrument(skip_all)]
pub async fn logout(session: Session) -> Redirect {
    if let Err(e) = clear_current_user(&session).await {
        tracing::error!("Failed to flush session: {}", e);
    }
    clear_sentry_user();

    Redirect::to("/")
}

/// Start an authenticated session and merge the anonymous cart.
///
/// A failed merge is reported but does not fail the login: the anonymous
/// cart and its cookie are left in place so a later login can retry.
async fn sign_in(
    state: &AppState,
    session: &Session,
    cookie: &mut LocalCartCookie,
    user: &User,
) -> Result<()> {
    set_current_user(session, &CurrentUser::from(user)).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    tracing::info!(user_id = %user.id, "User signed in");

    let mut ctx = CartContext::new(Caller::User(user.id), cookie);
    match state
        .carts()
        .merge_anonymous_cart_into_user_cart(&mut ctx, user.id)
        .await
    {
        Ok(MergeOutcome::Merged { cart_id, lines }) => {
            tracing::debug!(%cart_id, lines, "Anonymous cart merged at login");
        }
        Ok(MergeOutcome::NothingToMerge) => {}
        Err(e) => {
            let event_id = sentry::capture_error(&e);
            tracing::error!(
                error = %e,
                user_id = %user.id,
                sentry_event_id = %event_id,
                "Failed to merge anonymous cart at login"
            );
        }
    }

    Ok(())
}
