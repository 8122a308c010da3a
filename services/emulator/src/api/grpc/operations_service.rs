//! OperationsService gRPC 实现

use std::sync::Arc;

use emu_bootstrap::metrics::RequestTimer;
use rust_decimal::Decimal;
use tonic::{Request, Response, Status};
use tracing::debug;

use super::instruments_service::INSTRUMENT_TYPE_BOND;
use super::mapper::{decimal_to_quotation, money};
use crate::api::proto::invest::{
    PortfolioPosition, PortfolioRequest, PortfolioResponse, PositionsRequest, PositionsResponse,
    PositionsSecurities, operations_service_server::OperationsService,
};
use crate::domain::{AccountManager, InstrumentCatalog, OrderBookManager, Position};

pub struct OperationsServiceImpl {
    accounts: Arc<AccountManager>,
    book: Arc<OrderBookManager>,
    catalog: Arc<InstrumentCatalog>,
}

impl OperationsServiceImpl {
    pub fn new(
        accounts: Arc<AccountManager>,
        book: Arc<OrderBookManager>,
        catalog: Arc<InstrumentCatalog>,
    ) -> Self {
        Self {
            accounts,
            book,
            catalog,
        }
    }

    /// 估值价：最优买价，其次最优卖价，最后持仓均价
    fn valuation_price(&self, position: &Position) -> Decimal {
        self.book
            .best_bid()
            .or_else(|| self.book.best_ask())
            .unwrap_or(position.average_price)
    }

    fn portfolio(&self) -> PortfolioResponse {
        let account = self.accounts.snapshot();
        let currency = self.catalog.primary().currency.as_str();

        let mut bonds_total = Decimal::ZERO;
        let mut yield_total = Decimal::ZERO;
        let mut positions = Vec::new();

        for position in account.positions.values().filter(|p| p.quantity != 0) {
            let Some(instrument) = self.catalog.resolve(&position.instrument_id) else {
                continue;
            };
            let price = self.valuation_price(position);
            let lots = Decimal::from(position.quantity);
            let units = lots * Decimal::from(instrument.lot);
            // 价格按手计，与账户现金的扣减口径一致
            let expected_yield = (price - position.average_price) * lots;

            bonds_total += price * lots;
            yield_total += expected_yield;

            positions.push(PortfolioPosition {
                figi: instrument.figi.clone(),
                instrument_type: INSTRUMENT_TYPE_BOND.to_string(),
                quantity: Some(decimal_to_quotation(units)),
                average_position_price: Some(money(position.average_price, currency)),
                expected_yield: Some(decimal_to_quotation(expected_yield)),
                current_price: Some(money(price, currency)),
                quantity_lots: Some(decimal_to_quotation(lots)),
                blocked: false,
                position_uid: instrument.uid.clone(),
                instrument_uid: instrument.uid.clone(),
                ticker: instrument.ticker.clone(),
            });
        }

        let zero = || Some(money(Decimal::ZERO, currency));
        PortfolioResponse {
            total_amount_shares: zero(),
            total_amount_bonds: Some(money(bonds_total, currency)),
            total_amount_etf: zero(),
            total_amount_currencies: Some(money(account.balance, currency)),
            total_amount_futures: zero(),
            expected_yield: Some(decimal_to_quotation(yield_total)),
            positions,
            account_id: account.id,
            total_amount_options: zero(),
            total_amount_sp: zero(),
            total_amount_portfolio: Some(money(account.balance + bonds_total, currency)),
        }
    }

    fn positions(&self) -> PositionsResponse {
        let account = self.accounts.snapshot();
        let currency = self.catalog.primary().currency.as_str();

        let securities = account
            .positions
            .values()
            .filter(|p| p.quantity != 0)
            .filter_map(|position| {
                let instrument = self.catalog.resolve(&position.instrument_id)?;
                Some(PositionsSecurities {
                    figi: instrument.figi.clone(),
                    blocked: 0,
                    balance: position.quantity * i64::from(instrument.lot),
                    position_uid: instrument.uid.clone(),
                    instrument_uid: instrument.uid.clone(),
                    ticker: instrument.ticker.clone(),
                    class_code: instrument.class_code.clone(),
                    exchange_blocked: false,
                    instrument_type: INSTRUMENT_TYPE_BOND.to_string(),
                })
            })
            .collect();

        PositionsResponse {
            money: vec![money(account.balance, currency)],
            blocked: Vec::new(),
            securities,
            limits_loading_in_progress: false,
            account_id: account.id,
        }
    }
}

#[tonic::async_trait]
impl OperationsService for OperationsServiceImpl {
    async fn get_portfolio(
        &self,
        request: Request<PortfolioRequest>,
    ) -> Result<Response<PortfolioResponse>, Status> {
        let timer = RequestTimer::new("OperationsService", "GetPortfolio");
        debug!(account_id = %request.get_ref().account_id, "GetPortfolio request");

        let result = Ok(Response::new(self.portfolio()));
        timer.observe(&result);
        result
    }

    async fn get_positions(
        &self,
        request: Request<PositionsRequest>,
    ) -> Result<Response<PositionsResponse>, Status> {
        let timer = RequestTimer::new("OperationsService", "GetPositions");
        debug!(account_id = %request.get_ref().account_id, "GetPositions request");

        let result = Ok(Response::new(self.positions()));
        timer.observe(&result);
        result
    }
}
