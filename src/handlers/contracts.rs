//! Contract HTTP handlers.
//!
//! - POST /api/v1/contracts - Create a RIBPAY or VADS contract (tagged by `contract_type`)
//! - GET /api/v1/contracts
//! - GET /api/v1/contracts/{id}
//! - PATCH /api/v1/contracts/{id} - Move to another terminal of the same account
//! - DELETE /api/v1/contracts/{id} - Soft-delete, releasing provider resources

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    context::AppContext,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        contract::{Contract, ContractFilter, CreateContractRequest, ReassignContractRequest},
        pagination::{Page, PageRequest, PaginationQuery},
    },
    services::contract_service,
};

/// Create a contract.
///
/// # Request Body
///
/// ```json
/// {
///   "contract_type": "RIBPAY",
///   "account_id": "550e8400-...",
///   "iban": "FR76 3000 6000 0112 3456 7890 189"
/// }
/// ```
///
/// or
///
/// ```json
/// {
///   "contract_type": "VADS",
///   "account_id": "550e8400-...",
///   "contract_merchant_id": "1234567",
///   "contract_bank_name": "BNP Paribas",
///   "contract_bank_code": "30004",
///   "contract_max_amount": 5000
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: the contract. VADS contracts start inactive.
/// - **409**: the terminal already has a live contract of this type
/// - **502/503**: a payment provider call failed; provider resources
///   created before the failure are released
pub async fn create_contract(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateContractRequest>,
) -> Result<(StatusCode, Json<Contract>), AppError> {
    let contract = match request {
        CreateContractRequest::Ribpay(ribpay) => {
            contract_service::create_ribpay_contract(&ctx, &auth.scope, ribpay.validate()?).await?
        }
        CreateContractRequest::Vads(vads) => {
            contract_service::create_vads_contract(&ctx, &auth.scope, vads.validate()?).await?
        }
    };
    Ok((StatusCode::CREATED, Json(contract)))
}

pub async fn get_contract(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Contract>, AppError> {
    let contract = contract_service::get_contract(&ctx, &auth.scope, id).await?;
    Ok(Json(contract))
}

pub async fn list_contracts(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Query(pagination): Query<PaginationQuery>,
    Query(filter): Query<ContractFilter>,
) -> Result<Json<Page<Contract>>, AppError> {
    let page = PageRequest::from(pagination);
    let (contracts, total) =
        contract_service::list_contracts(&ctx, &auth.scope, &filter, page).await?;
    Ok(Json(Page::new(contracts, total, page, &ctx.link_base("contracts"))))
}

pub async fn reassign_contract(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReassignContractRequest>,
) -> Result<Json<Contract>, AppError> {
    let contract =
        contract_service::reassign_contract(&ctx, &auth.scope, id, request.terminal_id).await?;
    Ok(Json(contract))
}

/// Soft-delete a contract. A second call answers 409.
pub async fn delete_contract(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Contract>, AppError> {
    let contract = contract_service::remove_contract(&ctx, &auth.scope, id).await?;
    Ok(Json(contract))
}
