// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for schema validation over arbitrary JSON input

#![no_main]

use libfuzzer_sys::fuzz_target;
use tidemark_store::Schema;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    let schema = Schema::object()
        .property("name", Schema::string().required().min(1.0).max(64.0).pattern("^[a-z]+$"))
        .property("age", Schema::number().min(0.0))
        .property("active", Schema::boolean())
        .property("joined", Schema::date().nullable())
        .property("tags", Schema::array(Schema::string()));

    let result = schema.validate(&value);
    assert_eq!(result.is_valid, result.errors.is_empty());

    // A sanitized value is a fixed point.
    if result.is_valid {
        let again = schema.validate(&result.sanitized_value);
        assert!(again.is_valid, "{:?}", again.errors);
        assert_eq!(again.sanitized_value, result.sanitized_value);
    }
});
