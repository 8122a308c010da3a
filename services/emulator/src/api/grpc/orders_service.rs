//! OrdersService gRPC 实现

use std::sync::Arc;

use chrono::Utc;
use emu_bootstrap::metrics::RequestTimer;
use rust_decimal::Decimal;
use tonic::{Request, Response, Status};
use tracing::info;
use uuid::Uuid;

use super::mapper::{
    datetime_to_timestamp, decimal_to_quotation, direction_from_proto, direction_to_proto, money,
    order_state, order_type_from_proto, order_type_to_proto, quotation_to_decimal,
    status_to_proto,
};
use crate::api::proto::invest::{
    CancelOrderRequest, CancelOrderResponse, GetMaxLotsRequest, GetMaxLotsResponse,
    GetOrdersRequest, GetOrdersResponse, PostOrderRequest, PostOrderResponse, get_max_lots_response,
    orders_service_server::OrdersService,
};
use crate::application::TradingService;
use crate::domain::{Instrument, InstrumentCatalog, Order, OrderSource, OrderType};
use crate::error::EmulatorError;

pub struct OrdersServiceImpl {
    trading: Arc<TradingService>,
    catalog: Arc<InstrumentCatalog>,
}

impl OrdersServiceImpl {
    pub fn new(trading: Arc<TradingService>, catalog: Arc<InstrumentCatalog>) -> Self {
        Self { trading, catalog }
    }

    fn account_or_default(&self, account_id: &str) -> String {
        if account_id.is_empty() {
            self.trading.accounts().account_id()
        } else {
            account_id.to_string()
        }
    }

    fn resolve(&self, query: &str) -> Result<&Instrument, EmulatorError> {
        self.catalog
            .resolve(query)
            .ok_or_else(|| EmulatorError::InstrumentNotFound(query.to_string()))
    }

    fn post(&self, req: PostOrderRequest) -> Result<PostOrderResponse, EmulatorError> {
        let query = if req.instrument_id.is_empty() {
            req.figi.clone().unwrap_or_default()
        } else {
            req.instrument_id.clone()
        };
        let instrument = self.resolve(&query)?;
        let direction = direction_from_proto(req.direction)?;
        let order_type = order_type_from_proto(req.order_type)?;
        if req.quantity <= 0 {
            return Err(EmulatorError::InvalidQuantity(req.quantity));
        }
        let price = req
            .price
            .as_ref()
            .map(quotation_to_decimal)
            .unwrap_or(Decimal::ZERO);
        if order_type == OrderType::Limit && price <= Decimal::ZERO {
            return Err(EmulatorError::InvalidPrice);
        }

        let mut order = Order::new(
            instrument.uid.as_str(),
            self.account_or_default(&req.account_id),
            direction,
            order_type,
            price,
            req.quantity,
            OrderSource::Api,
        );
        // 客户端订单号是 UUID 时直接作为订单 id，否则只作为请求号回显
        if !req.order_id.is_empty() {
            if let Ok(id) = Uuid::parse_str(&req.order_id) {
                order = order.with_id(id);
            }
            order = order.with_request_id(req.order_id.as_str());
        }

        let execution = self.trading.submit(order)?;
        let order = &execution.order;
        let currency = instrument.currency.as_str();
        let executed_value = execution.executed_value();

        Ok(PostOrderResponse {
            order_id: order.id.to_string(),
            execution_report_status: status_to_proto(order.status) as i32,
            lots_requested: order.quantity,
            lots_executed: order.filled_quantity,
            initial_order_price: Some(money(order.notional(), currency)),
            executed_order_price: Some(money(executed_value, currency)),
            total_order_amount: Some(money(executed_value, currency)),
            initial_commission: Some(money(Decimal::ZERO, currency)),
            executed_commission: Some(money(Decimal::ZERO, currency)),
            aci_value: Some(money(Decimal::ZERO, currency)),
            figi: instrument.figi.clone(),
            direction: direction_to_proto(order.direction) as i32,
            initial_security_price: Some(money(order.price, currency)),
            order_type: order_type_to_proto(order.order_type) as i32,
            message: String::new(),
            initial_order_price_pt: Some(decimal_to_quotation(order.price)),
            instrument_uid: instrument.uid.clone(),
            order_request_id: order.request_id.clone().unwrap_or_default(),
        })
    }

    fn cancel(&self, req: CancelOrderRequest) -> Result<CancelOrderResponse, EmulatorError> {
        let id = Uuid::parse_str(&req.order_id)
            .map_err(|_| EmulatorError::InvalidOrderId(req.order_id.clone()))?;
        self.trading.cancel(&id, Some(req.account_id.as_str()))?;
        Ok(CancelOrderResponse {
            time: Some(datetime_to_timestamp(Utc::now())),
        })
    }

    fn max_lots(&self, req: GetMaxLotsRequest) -> Result<GetMaxLotsResponse, EmulatorError> {
        let instrument = self.resolve(&req.instrument_id)?;
        let book = self.trading.book();
        let price = req
            .price
            .as_ref()
            .map(quotation_to_decimal)
            .filter(|p| !p.is_zero())
            .or_else(|| book.best_ask())
            .or_else(|| book.best_bid());

        let accounts = self.trading.accounts();
        let buy_lots = accounts.max_lots(&instrument.uid, true, price);
        let sell_lots = accounts.max_lots(&instrument.uid, false, price);
        let cash = Some(decimal_to_quotation(accounts.balance()));

        let buy = get_max_lots_response::BuyLimitsView {
            buy_money_amount: cash,
            buy_max_lots: buy_lots,
            buy_max_market_lots: buy_lots,
        };
        let sell = get_max_lots_response::SellLimitsView {
            sell_max_lots: sell_lots,
        };

        Ok(GetMaxLotsResponse {
            currency: instrument.currency.clone(),
            buy_limits: Some(buy.clone()),
            buy_margin_limits: Some(buy),
            sell_limits: Some(sell.clone()),
            sell_margin_limits: Some(sell),
        })
    }
}

#[tonic::async_trait]
impl OrdersService for OrdersServiceImpl {
    async fn post_order(
        &self,
        request: Request<PostOrderRequest>,
    ) -> Result<Response<PostOrderResponse>, Status> {
        let timer = RequestTimer::new("OrdersService", "PostOrder");
        let req = request.into_inner();
        info!(
            instrument_id = %req.instrument_id,
            direction = req.direction,
            order_type = req.order_type,
            quantity = req.quantity,
            order_id = %req.order_id,
            "PostOrder request"
        );

        let result = self.post(req).map(Response::new).map_err(Status::from);
        timer.observe(&result);
        result
    }

    async fn cancel_order(
        &self,
        request: Request<CancelOrderRequest>,
    ) -> Result<Response<CancelOrderResponse>, Status> {
        let timer = RequestTimer::new("OrdersService", "CancelOrder");
        let req = request.into_inner();
        info!(order_id = %req.order_id, account_id = %req.account_id, "CancelOrder request");

        let result = self.cancel(req).map(Response::new).map_err(Status::from);
        timer.observe(&result);
        result
    }

    async fn get_orders(
        &self,
        request: Request<GetOrdersRequest>,
    ) -> Result<Response<GetOrdersResponse>, Status> {
        let timer = RequestTimer::new("OrdersService", "GetOrders");
        let account_id = self.account_or_default(&request.into_inner().account_id);

        let orders = self
            .trading
            .book()
            .orders_for_account(&account_id)
            .iter()
            .filter_map(|order| {
                self.catalog
                    .resolve(&order.instrument_id)
                    .map(|instrument| order_state(order, instrument))
            })
            .collect();

        let result = Ok(Response::new(GetOrdersResponse { orders }));
        timer.observe(&result);
        result
    }

    async fn get_max_lots(
        &self,
        request: Request<GetMaxLotsRequest>,
    ) -> Result<Response<GetMaxLotsResponse>, Status> {
        let timer = RequestTimer::new("OrdersService", "GetMaxLots");
        let result = self
            .max_lots(request.into_inner())
            .map(Response::new)
            .map_err(Status::from);
        timer.observe(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::proto::invest::{OrderDirection, OrderExecutionReportStatus, Quotation};
    use crate::api::proto::invest::OrderType as ProtoOrderType;
    use crate::domain::{AccountManager, EventBus, OrderBookManager};
    use emu_config::{AccountConfig, InstrumentConfig, OrderBookConfig};

    const UID: &str = "e8acd2fb-6de6-4ea4-9bfb-0daad9b2ed7b";

    fn service() -> OrdersServiceImpl {
        let instrument = Instrument::from(&InstrumentConfig::default());
        let bus = EventBus::new(64);
        let book = Arc::new(OrderBookManager::new(&instrument.uid, bus.clone()));
        book.seed(&OrderBookConfig::default());
        let accounts = Arc::new(AccountManager::new(&AccountConfig::default()));
        let trading = Arc::new(TradingService::new(book, accounts, bus));
        OrdersServiceImpl::new(trading, Arc::new(InstrumentCatalog::single(instrument)))
    }

    fn post_request(
        direction: OrderDirection,
        order_type: ProtoOrderType,
        price: Option<Quotation>,
        quantity: i64,
        order_id: &str,
    ) -> PostOrderRequest {
        PostOrderRequest {
            figi: None,
            quantity,
            price,
            direction: direction as i32,
            account_id: "emulator-account".into(),
            order_type: order_type as i32,
            order_id: order_id.into(),
            instrument_id: "TBRU".into(),
        }
    }

    #[tokio::test]
    async fn test_post_market_order_fills() {
        let resp = service()
            .post_order(Request::new(post_request(
                OrderDirection::Buy,
                ProtoOrderType::Market,
                None,
                10,
                "bot-1",
            )))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(
            resp.execution_report_status,
            OrderExecutionReportStatus::ExecutionReportStatusFill as i32
        );
        assert_eq!(resp.lots_requested, 10);
        assert_eq!(resp.lots_executed, 10);
        assert_eq!(resp.executed_order_price, Some(money("77.1".parse().unwrap(), "rub")));
        assert_eq!(resp.order_request_id, "bot-1");
        assert_eq!(resp.instrument_uid, UID);
        assert!(Uuid::parse_str(&resp.order_id).is_ok());
    }

    #[tokio::test]
    async fn test_post_limit_then_get_and_cancel() {
        let svc = service();
        let client_id = Uuid::new_v4().to_string();
        let resp = svc
            .post_order(Request::new(post_request(
                OrderDirection::Buy,
                ProtoOrderType::Limit,
                Some(Quotation { units: 7, nano: 600_000_000 }),
                3,
                &client_id,
            )))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.order_id, client_id);
        assert_eq!(
            resp.execution_report_status,
            OrderExecutionReportStatus::ExecutionReportStatusNew as i32
        );
        assert_eq!(resp.initial_order_price, Some(money("22.8".parse().unwrap(), "rub")));

        let orders = svc
            .get_orders(Request::new(GetOrdersRequest {
                account_id: "emulator-account".into(),
            }))
            .await
            .unwrap()
            .into_inner()
            .orders;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_id, client_id);

        let status = svc
            .cancel_order(Request::new(CancelOrderRequest {
                account_id: "other".into(),
                order_id: client_id.clone(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::PermissionDenied);

        let status = svc
            .cancel_order(Request::new(CancelOrderRequest {
                account_id: String::new(),
                order_id: client_id.clone(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::PermissionDenied);

        let resp = svc
            .cancel_order(Request::new(CancelOrderRequest {
                account_id: "emulator-account".into(),
                order_id: client_id.clone(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(resp.time.is_some());

        let status = svc
            .cancel_order(Request::new(CancelOrderRequest {
                account_id: "emulator-account".into(),
                order_id: client_id,
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn test_post_validation() {
        let svc = service();
        let cases = [
            post_request(OrderDirection::Buy, ProtoOrderType::Limit, None, 1, ""),
            post_request(OrderDirection::Buy, ProtoOrderType::Market, None, 0, ""),
            post_request(OrderDirection::Unspecified, ProtoOrderType::Market, None, 1, ""),
            post_request(OrderDirection::Buy, ProtoOrderType::Unspecified, None, 1, ""),
        ];
        for req in cases {
            let status = svc.post_order(Request::new(req)).await.unwrap_err();
            assert_eq!(status.code(), tonic::Code::InvalidArgument);
        }

        let mut unknown = post_request(OrderDirection::Buy, ProtoOrderType::Market, None, 1, "");
        unknown.instrument_id = "SBER".into();
        let status = svc.post_order(Request::new(unknown)).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let status = svc
            .cancel_order(Request::new(CancelOrderRequest {
                account_id: String::new(),
                order_id: "not-a-uuid".into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_get_max_lots_uses_best_ask() {
        let resp = service()
            .get_max_lots(Request::new(GetMaxLotsRequest {
                account_id: "emulator-account".into(),
                instrument_id: UID.into(),
                price: None,
            }))
            .await
            .unwrap()
            .into_inner();

        // 200000 / 7.71
        assert_eq!(resp.buy_limits.unwrap().buy_max_lots, 25940);
        assert_eq!(resp.sell_limits.unwrap().sell_max_lots, 25940);
        assert_eq!(resp.currency, "rub");
    }

    #[tokio::test]
    async fn test_get_max_lots_zero_price_falls_back_to_book() {
        let resp = service()
            .get_max_lots(Request::new(GetMaxLotsRequest {
                account_id: "emulator-account".into(),
                instrument_id: UID.into(),
                price: Some(Quotation { units: 0, nano: 0 }),
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(resp.buy_limits.unwrap().buy_max_lots, 25940);
        assert_eq!(resp.sell_limits.unwrap().sell_max_lots, 25940);
    }
}
