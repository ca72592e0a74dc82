//! Message dispatch
//!
//! The registry routes each incoming message to one handler by tag. Subsystems
//! that own message types install their handlers through [`RegisterMessageHandlers`].

mod client_commands;
mod registry;

pub use client_commands::ClientCommands;
pub use registry::{DispatchError, Handler, HandlerFault, MessageDispatchRegistry};

use std::sync::Arc;

use tracing::debug;

use crate::messages::{RegisterExpressionViewMessage, RegisterTestsMessage, ReportStatisticsMessage};
use crate::model::Model;

/// A collaborator that claims message tags in the registry
pub trait RegisterMessageHandlers: Send + Sync {
    fn register_message_handlers(&self, registry: &mut MessageDispatchRegistry);
}

/// Install the test, statistics and expression handlers against `model`
pub fn install_model_handlers(registry: &mut MessageDispatchRegistry, model: Arc<dyn Model>) {
    debug!("install_model_handlers: called");

    let tests_model = model.clone();
    registry.register::<RegisterTestsMessage, _>(move |message| {
        tests_model.register_tests(&message.tests)?;
        Ok(())
    });

    let statistics_model = model.clone();
    registry.register::<ReportStatisticsMessage, _>(move |message| {
        statistics_model.add_statistics_delta(&message.delta)?;
        Ok(())
    });

    registry.register::<RegisterExpressionViewMessage, _>(move |message| {
        model.register_expression(&message.view)?;
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ExpressionView, Message, MessageTag, StatisticsDelta, StatisticsSample, TestId};
    use crate::model::ConsoleModel;

    #[test]
    fn test_model_handlers_route_to_model() {
        let model = Arc::new(ConsoleModel::new());
        let mut registry = MessageDispatchRegistry::new();
        install_model_handlers(&mut registry, model.clone());

        registry.dispatch(&Message::register_tests(["T1", "T2"])).unwrap();
        registry
            .dispatch(&Message::report_statistics(StatisticsDelta::single(
                "T1",
                StatisticsSample {
                    transactions: 1,
                    errors: 0,
                    total_time_ms: 5,
                },
            )))
            .unwrap();
        registry
            .dispatch(&Message::register_expression_view(ExpressionView::new("mean-response", "(/ t n)")))
            .unwrap();

        assert_eq!(model.registered_tests(), vec![TestId::new("T1"), TestId::new("T2")]);
        assert_eq!(model.statistics(&TestId::new("T1")).unwrap().deltas_applied, 1);
        assert_eq!(model.expressions()[0].display_name, "mean-response");
    }

    #[test]
    fn test_model_fault_becomes_handler_error() {
        let model = Arc::new(ConsoleModel::new());
        let mut registry = MessageDispatchRegistry::new();
        install_model_handlers(&mut registry, model);

        let err = registry
            .dispatch(&Message::report_statistics(StatisticsDelta::single(
                "missing",
                StatisticsSample::default(),
            )))
            .unwrap_err();

        assert!(matches!(err, DispatchError::Handler { tag: MessageTag::ReportStatistics, .. }));
        assert!(err.to_string().contains("missing"));
    }
}
