//! Built-in callbacks for the node-level dumps: service discovery (`SD`),
//! diagnostics (`DGN`) and node parameters (`PARAN`).
use crate::core::{opcodes, Message};
use crate::protocol::timed_response::{
    Requester, ResponseContext, ResponseKind, ResponseRequest, ResponseStep, ResponseTarget,
};

/// Parameters reported by `RQNPN` dumps.
pub const NODE_PARAMETER_COUNT: u8 = 20;

fn emit(message: Option<Message>) -> ResponseStep {
    message.map_or(ResponseStep::Finished, ResponseStep::Emit)
}

/// `SD` frames: step 0 reports the number of services, step `n` the `n`-th service.
pub fn service_discovery(_request: &ResponseRequest, ctx: &ResponseContext<'_>) -> ResponseStep {
    let nn = ctx.node.node_number;
    if ctx.step == 0 {
        let count = ctx.services.len().min(u8::MAX as usize) as u8;
        return emit(Message::with_node_number(opcodes::SD, nn, &[0, 0, count]).ok());
    }
    match ctx.services.service(ctx.step as usize - 1) {
        Some(service) => emit(
            Message::with_node_number(opcodes::SD, nn, &[ctx.step, service.id(), service.version()]).ok(),
        ),
        None => ResponseStep::Finished,
    }
}

/// `DGN` frames for every diagnostic of the current service, index 0 first.
///
/// A service without diagnostics answers a single all-zero `DGN`.
pub fn all_diagnostics(_request: &ResponseRequest, ctx: &ResponseContext<'_>) -> ResponseStep {
    let (Some(index), Some(service)) = (ctx.service_index, ctx.service()) else {
        return ResponseStep::Finished;
    };
    let nn = ctx.node.node_number;
    let service_number = (index + 1).min(u8::MAX as usize) as u8;

    if service.diagnostic_count() == 0 {
        return if ctx.step == 0 {
            emit(Message::with_node_number(opcodes::DGN, nn, &[service_number, 0, 0, 0]).ok())
        } else {
            ResponseStep::Finished
        };
    }

    match service.diagnostic(ctx.step) {
        Some(value) => emit(
            Message::with_node_number(
                opcodes::DGN,
                nn,
                &[service_number, ctx.step, value.hi(), value.lo()],
            )
            .ok(),
        ),
        None => ResponseStep::Finished,
    }
}

/// `PARAN` frames for parameters 1 to [`NODE_PARAMETER_COUNT`].
pub fn parameters(_request: &ResponseRequest, ctx: &ResponseContext<'_>) -> ResponseStep {
    let index = ctx.step.saturating_add(1);
    emit(
        Message::with_node_number(opcodes::PARAN, ctx.node.node_number, &[index, ctx.node.parameter(index)])
            .ok(),
    )
}

impl ResponseRequest {
    /// Service discovery: the header, then one `SD` per registered service.
    pub fn service_discovery(requester: Requester) -> Self {
        Self {
            kind: ResponseKind::Rqsd,
            requester,
            target: ResponseTarget::Node,
            item_count: u8::MAX,
            callback: service_discovery,
        }
    }

    /// All diagnostics of `target` (one service, or every service in turn).
    pub fn diagnostics(requester: Requester, target: ResponseTarget) -> Self {
        Self {
            kind: ResponseKind::Rdgn,
            requester,
            target,
            item_count: u8::MAX,
            callback: all_diagnostics,
        }
    }

    /// Node parameters 1 to [`NODE_PARAMETER_COUNT`].
    pub fn parameters(requester: Requester) -> Self {
        Self {
            kind: ResponseKind::Rqnpn,
            requester,
            target: ResponseTarget::Node,
            item_count: NODE_PARAMETER_COUNT,
            callback: parameters,
        }
    }
}
