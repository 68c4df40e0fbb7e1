//! Probe endpoints.

/// Liveness probe.
pub async fn liveness_probe() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_liveness_probe() {
        assert_eq!(liveness_probe().await, "ok");
    }
}
