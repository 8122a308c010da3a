//! UsersService gRPC 实现

use std::sync::Arc;

use chrono::{DateTime, Utc};
use emu_bootstrap::metrics::RequestTimer;
use tonic::{Request, Response, Status};

use super::mapper::datetime_to_timestamp;
use crate::api::proto::invest::{
    AccessLevel, Account, AccountStatus, AccountType, GetAccountsRequest, GetAccountsResponse,
    GetInfoRequest, GetInfoResponse, users_service_server::UsersService,
};
use crate::domain::AccountManager;

const ACCOUNT_NAME: &str = "Mock Account";
const TARIFF: &str = "investor";

pub struct UsersServiceImpl {
    accounts: Arc<AccountManager>,
    opened_at: DateTime<Utc>,
}

impl UsersServiceImpl {
    pub fn new(accounts: Arc<AccountManager>) -> Self {
        Self {
            accounts,
            opened_at: Utc::now(),
        }
    }

    fn account(&self) -> Account {
        Account {
            id: self.accounts.account_id(),
            r#type: AccountType::Tinkoff as i32,
            name: ACCOUNT_NAME.to_string(),
            status: AccountStatus::Open as i32,
            opened_date: Some(datetime_to_timestamp(self.opened_at)),
            closed_date: None,
            access_level: AccessLevel::AccountAccessLevelFullAccess as i32,
        }
    }
}

/// 模拟账户总是处于 OPEN 状态
fn status_matches(filter: Option<i32>) -> bool {
    match filter.map(AccountStatus::try_from) {
        None => true,
        Some(Ok(AccountStatus::Unspecified | AccountStatus::Open | AccountStatus::All)) => true,
        Some(_) => false,
    }
}

#[tonic::async_trait]
impl UsersService for UsersServiceImpl {
    async fn get_accounts(
        &self,
        request: Request<GetAccountsRequest>,
    ) -> Result<Response<GetAccountsResponse>, Status> {
        let timer = RequestTimer::new("UsersService", "GetAccounts");
        let accounts = if status_matches(request.into_inner().status) {
            vec![self.account()]
        } else {
            Vec::new()
        };

        let result = Ok(Response::new(GetAccountsResponse { accounts }));
        timer.observe(&result);
        result
    }

    async fn get_info(
        &self,
        _request: Request<GetInfoRequest>,
    ) -> Result<Response<GetInfoResponse>, Status> {
        let timer = RequestTimer::new("UsersService", "GetInfo");
        let result = Ok(Response::new(GetInfoResponse {
            prem_status: false,
            qual_status: true,
            qualified_for_work_with: Vec::new(),
            tariff: TARIFF.to_string(),
            user_id: self.accounts.account_id(),
            risk_level_code: String::new(),
        }));
        timer.observe(&result);
        result
    }
}
