//! MarketDataService gRPC 实现

use std::sync::Arc;

use emu_bootstrap::metrics::RequestTimer;
use rust_decimal::Decimal;
use tonic::{Request, Response, Status};
use tracing::debug;

use super::mapper::{datetime_to_timestamp, decimal_to_quotation, levels_to_proto, price_limits};
use crate::api::proto::invest::{
    GetOrderBookRequest, GetOrderBookResponse, GetTradingStatusRequest, GetTradingStatusResponse,
    SecurityTradingStatus, market_data_service_server::MarketDataService,
};
use crate::domain::{Instrument, InstrumentCatalog, OrderBookManager};
use crate::error::EmulatorError;

pub struct MarketDataServiceImpl {
    book: Arc<OrderBookManager>,
    catalog: Arc<InstrumentCatalog>,
    reference_price: Decimal,
}

impl MarketDataServiceImpl {
    pub fn new(
        book: Arc<OrderBookManager>,
        catalog: Arc<InstrumentCatalog>,
        reference_price: Decimal,
    ) -> Self {
        Self {
            book,
            catalog,
            reference_price,
        }
    }

    /// instrument_id 优先，其次是已废弃的 figi
    fn resolve(
        &self,
        instrument_id: Option<&str>,
        figi: Option<&str>,
    ) -> Result<&Instrument, EmulatorError> {
        let query = instrument_id
            .filter(|s| !s.is_empty())
            .or(figi)
            .unwrap_or_default();
        self.catalog
            .resolve(query)
            .ok_or_else(|| EmulatorError::InstrumentNotFound(query.to_string()))
    }

    fn order_book(&self, req: GetOrderBookRequest) -> Result<GetOrderBookResponse, EmulatorError> {
        let instrument = self.resolve(req.instrument_id.as_deref(), req.figi.as_deref())?;
        if req.depth <= 0 {
            return Err(EmulatorError::InvalidDepth(req.depth));
        }

        let snapshot = self.book.snapshot(req.depth as usize);
        let (limit_up, limit_down) = price_limits(&snapshot, self.reference_price);

        Ok(GetOrderBookResponse {
            figi: instrument.figi.clone(),
            depth: req.depth,
            bids: levels_to_proto(&snapshot.bids),
            asks: levels_to_proto(&snapshot.asks),
            last_price: None,
            close_price: None,
            limit_up: Some(decimal_to_quotation(limit_up)),
            limit_down: Some(decimal_to_quotation(limit_down)),
            instrument_uid: instrument.uid.clone(),
            last_price_ts: None,
            close_price_ts: None,
            orderbook_ts: Some(datetime_to_timestamp(snapshot.timestamp)),
        })
    }
}

#[tonic::async_trait]
impl MarketDataService for MarketDataServiceImpl {
    async fn get_order_book(
        &self,
        request: Request<GetOrderBookRequest>,
    ) -> Result<Response<GetOrderBookResponse>, Status> {
        let timer = RequestTimer::new("MarketDataService", "GetOrderBook");
        let req = request.into_inner();
        debug!(instrument_id = ?req.instrument_id, depth = req.depth, "GetOrderBook request");

        let result = self
            .order_book(req)
            .map(Response::new)
            .map_err(Status::from);
        timer.observe(&result);
        result
    }

    async fn get_trading_status(
        &self,
        request: Request<GetTradingStatusRequest>,
    ) -> Result<Response<GetTradingStatusResponse>, Status> {
        let timer = RequestTimer::new("MarketDataService", "GetTradingStatus");
        let req = request.into_inner();

        let result = self
            .resolve(req.instrument_id.as_deref(), req.figi.as_deref())
            .map(|instrument| {
                Response::new(GetTradingStatusResponse {
                    figi: instrument.figi.clone(),
                    trading_status: SecurityTradingStatus::NormalTrading as i32,
                    limit_order_available_flag: true,
                    market_order_available_flag: true,
                    api_trade_available_flag: true,
                    instrument_uid: instrument.uid.clone(),
                    bestprice_order_available_flag: true,
                    only_best_price: false,
                    ticker: instrument.ticker.clone(),
                    class_code: instrument.class_code.clone(),
                })
            })
            .map_err(Status::from);
        timer.observe(&result);
        result
    }
}
