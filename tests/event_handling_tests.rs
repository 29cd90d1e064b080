mod common;

use std::collections::HashMap;
use std::sync::Arc;

use as4_msh::core::events::{HandlerFactoryRegistry, MessageProcessingEventHandler};
use as4_msh::core::processing::InboundProcessor;
use as4_msh::domain::entities::pmode::{EventHandlerConfig, ReplyPattern};
use as4_msh::domain::entities::{EventClass, MessageUnitClass};
use as4_msh::{MshContext, Result};
use common::*;

struct Handlers {
    msh: Arc<MshContext>,
    audit: Arc<RecordingHandler>,
    global: Arc<RecordingHandler>,
    _dir: tempfile::TempDir,
}

fn register(registry: &mut HandlerFactoryRegistry, name: &str, handler: Arc<RecordingHandler>) {
    registry.register(
        name,
        Arc::new(
            move |_: &HashMap<String, String>| -> Result<Arc<dyn MessageProcessingEventHandler>> {
                Ok(handler.clone())
            },
        ),
    );
}

fn setup(audit_config: EventHandlerConfig) -> Handlers {
    let dir = tempfile::tempdir().unwrap();
    let audit = Arc::new(RecordingHandler::default());
    let global = Arc::new(RecordingHandler::default());

    let mut registry = HandlerFactoryRegistry::with_builtin();
    register(&mut registry, "audit", audit.clone());
    register(&mut registry, "global", global.clone());

    let msh = MshContext::builder()
        .handler_factories(registry)
        .global_handlers(vec![EventHandlerConfig::new("global")])
        .payload_dir(dir.path().join("payloads"))
        .build()
        .unwrap();

    let mut leg = LegBuilder::new()
        .receipt(ReplyPattern::Response)
        .file_delivery(&dir.path().join("delivered"))
        .build();
    leg.event_handlers = vec![audit_config];
    msh.deploy_pmode(with_leg(TestFixtures::pmode("events", "push"), leg))
        .unwrap();

    Handlers {
        msh,
        audit,
        global,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_leg_handler_takes_precedence_over_global() {
    let mut config = EventHandlerConfig::new("audit");
    config.applies_to = vec![EventClass::MessageDelivery];
    let h = setup(config);

    InboundProcessor::new(h.msh.clone())
        .process_request(vec![TestFixtures::received_order("evt-1@seller")])
        .await;

    assert_eq!(h.audit.classes(), vec![EventClass::MessageDelivery]);
    assert_eq!(h.global.classes(), vec![EventClass::ReceiptCreated]);
}

#[tokio::test]
async fn test_handler_subscribes_to_event_family() {
    let mut config = EventHandlerConfig::new("audit");
    config.applies_to = vec![EventClass::MessageProcessing];
    let h = setup(config);

    InboundProcessor::new(h.msh.clone())
        .process_request(vec![TestFixtures::received_order("evt-2@seller")])
        .await;

    assert_eq!(
        h.audit.classes(),
        vec![EventClass::MessageDelivery, EventClass::ReceiptCreated]
    );
    assert!(h.global.events().is_empty());
}

#[tokio::test]
async fn test_unit_filter_limits_leg_handler() {
    let mut config = EventHandlerConfig::new("audit");
    config.for_message_units = vec![MessageUnitClass::SignalMessage];
    let h = setup(config);

    InboundProcessor::new(h.msh.clone())
        .process_request(vec![TestFixtures::received_order("evt-3@seller")])
        .await;

    // all events are about the User Message
    assert!(h.audit.events().is_empty());
    assert_eq!(h.global.events().len(), 2);
}

#[tokio::test]
async fn test_events_without_pmode_go_to_global_handlers() {
    let h = setup(EventHandlerConfig::new("audit"));
    let mut unit = TestFixtures::received_order("evt-4@seller");
    if let Some(um) = unit.as_user_message_mut() {
        um.collaboration_info.action.clear();
    }

    InboundProcessor::new(h.msh.clone())
        .process_request(vec![unit])
        .await;

    assert!(h.audit.events().is_empty());
    assert_eq!(h.global.classes(), vec![EventClass::HeaderValidationFailed]);
}
