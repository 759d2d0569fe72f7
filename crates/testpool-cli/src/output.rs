use serde_json::Value;

/// Render the `status` subcommand's pool list (§10.F) as a fixed-width table.
pub fn render_pool_table(pools: &[Value]) -> String {
    if pools.is_empty() {
        return "No pools.".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:<20} {:>8} {:>8} {:>8} {:>8} {:>8}\n",
        "POOL", "MAX", "READY", "RESERVED", "PENDING", "BAD"
    ));
    for pool in pools {
        out.push_str(&format!(
            "{:<20} {:>8} {:>8} {:>8} {:>8} {:>8}\n",
            pool.get("name").and_then(Value::as_str).unwrap_or("?"),
            pool.get("resource_max").and_then(Value::as_u64).unwrap_or(0),
            pool.get("ready").and_then(Value::as_u64).unwrap_or(0),
            pool.get("reserved").and_then(Value::as_u64).unwrap_or(0),
            pool.get("pending").and_then(Value::as_u64).unwrap_or(0),
            pool.get("bad").and_then(Value::as_u64).unwrap_or(0),
        ));
    }
    out
}
