// tests/property/options_test.rs

//! Property-based tests for caller input handling
//! Tests option sanitisation and that arbitrary frames never panic the parser

use liverelay::core::protocol::ClientCommand;
use liverelay::core::upstream::ConnectOptions;
use liverelay::core::upstream::options::{ALWAYS_STRIPPED_KEYS, SESSION_ID_KEY};
use proptest::prelude::*;
use serde_json::{Map, Value, json};

fn option_map() -> impl Strategy<Value = Map<String, Value>> {
    let key = prop_oneof![
        Just("requestOptions".to_string()),
        Just("websocketOptions".to_string()),
        Just("sessionId".to_string()),
        Just("proxy".to_string()),
        "[a-zA-Z]{1,16}",
    ];
    let value = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        ".{0,32}".prop_map(Value::from),
    ];
    prop::collection::btree_map(key, value, 0..=12)
        .prop_map(|m| m.into_iter().collect::<Map<String, Value>>())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_sanitized_options_never_carry_overrides(
        raw in option_map(),
        strip_proxy in any::<bool>(),
        session_id in prop::option::of("[a-z0-9]{1,24}")
    ) {
        let extra = if strip_proxy { vec!["proxy".to_string()] } else { Vec::new() };
        let opts = ConnectOptions::sanitize(Value::Object(raw.clone()), &extra, session_id.as_deref());

        for key in ALWAYS_STRIPPED_KEYS {
            prop_assert!(!opts.contains_key(key));
        }
        if strip_proxy {
            prop_assert!(!opts.contains_key("proxy"));
        }
        match &session_id {
            Some(id) => prop_assert_eq!(opts.get(SESSION_ID_KEY), Some(&json!(id))),
            None => prop_assert_eq!(opts.get(SESSION_ID_KEY), raw.get(SESSION_ID_KEY)),
        }
        for (key, value) in opts.as_map() {
            if key != SESSION_ID_KEY {
                prop_assert_eq!(raw.get(key), Some(value));
            }
        }
    }

    #[test]
    fn test_parse_never_panics(text in ".{0,256}") {
        let _ = ClientCommand::parse(&text);
    }

    #[test]
    fn test_any_string_room_is_accepted(room in ".{0,64}") {
        let frame = json!({ "event": "setUniqueId", "data": { "uniqueId": room } }).to_string();
        let parsed = ClientCommand::parse(&frame);
        prop_assert_eq!(
            parsed.ok(),
            Some(ClientCommand::SetUniqueId { unique_id: room, options: Value::Null })
        );
    }
}
