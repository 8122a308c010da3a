//! InstrumentsService gRPC 实现

use std::sync::Arc;

use emu_bootstrap::metrics::RequestTimer;
use tonic::{Request, Response, Status};
use tracing::debug;

use crate::api::proto::invest::{
    FindInstrumentRequest, FindInstrumentResponse, InstrumentShort, InstrumentType,
    instruments_service_server::InstrumentsService,
};
use crate::domain::{Instrument, InstrumentCatalog};

/// 标的类型字符串，与 PortfolioPosition 中保持一致
pub const INSTRUMENT_TYPE_BOND: &str = "bond";

pub struct InstrumentsServiceImpl {
    catalog: Arc<InstrumentCatalog>,
}

impl InstrumentsServiceImpl {
    pub fn new(catalog: Arc<InstrumentCatalog>) -> Self {
        Self { catalog }
    }
}

fn instrument_short(instrument: &Instrument) -> InstrumentShort {
    InstrumentShort {
        isin: String::new(),
        figi: instrument.figi.clone(),
        ticker: instrument.ticker.clone(),
        class_code: instrument.class_code.clone(),
        instrument_type: INSTRUMENT_TYPE_BOND.to_string(),
        name: instrument.name.clone(),
        uid: instrument.uid.clone(),
        position_uid: instrument.uid.clone(),
        instrument_kind: InstrumentType::Bond as i32,
        api_trade_available_flag: true,
        for_iis_flag: true,
        first_1min_candle_date: None,
        first_1day_candle_date: None,
        for_qual_investor_flag: false,
        weekend_flag: false,
        blocked_tca_flag: false,
        lot: instrument.lot,
    }
}

/// 请求中的可选过滤条件
fn passes_filters(req: &FindInstrumentRequest) -> bool {
    let kind_ok = match req.instrument_kind {
        None => true,
        Some(kind) => {
            kind == InstrumentType::Unspecified as i32 || kind == InstrumentType::Bond as i32
        }
    };
    let api_ok = req.api_trade_available_flag.unwrap_or(true);
    kind_ok && api_ok
}

#[tonic::async_trait]
impl InstrumentsService for InstrumentsServiceImpl {
    async fn find_instrument(
        &self,
        request: Request<FindInstrumentRequest>,
    ) -> Result<Response<FindInstrumentResponse>, Status> {
        let timer = RequestTimer::new("InstrumentsService", "FindInstrument");
        let req = request.into_inner();
        debug!(query = %req.query, "FindInstrument request");

        let instruments = self
            .catalog
            .resolve(&req.query)
            .filter(|_| passes_filters(&req))
            .map(instrument_short)
            .into_iter()
            .collect();

        let result = Ok(Response::new(FindInstrumentResponse { instruments }));
        timer.observe(&result);
        result
    }
}
