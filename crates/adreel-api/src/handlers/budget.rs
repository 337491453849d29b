//! Public budget status.

use axum::extract::State;

use adreel_models::BudgetStatus;

use crate::response::{ok, ApiJson};
use crate::state::AppState;

pub async fn get_budget(State(state): State<AppState>) -> ApiJson<BudgetStatus> {
    ok(state.budget.get_budget_status().await)
}
