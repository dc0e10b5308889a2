//! Key layout for the fjall partitions backing the Durable Store.
//!
//! Partition structure:
//! - `jobs`: job:{job_id} -> Job (JSON)
//! - `files`: file:{file_id} -> File (JSON)
//! - `failed_requests`: dlq:{job_id}:{request_index:016} -> FailedRequest (JSON)
//! - `webhook_deliveries`: wh:{delivery_id} -> WebhookDelivery (JSON)
//! - `heartbeat`: hb:{worker_id} -> WorkerHeartbeat (JSON)
//! - `models`: model:{model_name} -> ModelInfo (JSON)

pub fn encode_job_key(job_id: &str) -> Vec<u8> {
    format!("job:{job_id}").into_bytes()
}

pub fn decode_job_key(key: &[u8]) -> Option<String> {
    std::str::from_utf8(key)
        .ok()?
        .strip_prefix("job:")
        .map(String::from)
}

pub fn encode_file_key(file_id: &str) -> Vec<u8> {
    format!("file:{file_id}").into_bytes()
}

pub fn encode_dlq_key(job_id: &str, request_index: u64) -> Vec<u8> {
    format!("dlq:{job_id}:{request_index:016}").into_bytes()
}

pub fn encode_dlq_prefix(job_id: &str) -> Vec<u8> {
    format!("dlq:{job_id}:").into_bytes()
}

pub fn encode_webhook_key(delivery_id: &str) -> Vec<u8> {
    format!("wh:{delivery_id}").into_bytes()
}

pub fn encode_heartbeat_key(worker_id: &str) -> Vec<u8> {
    format!("hb:{worker_id}").into_bytes()
}

pub fn encode_model_key(model_name: &str) -> Vec<u8> {
    format!("model:{model_name}").into_bytes()
}

pub fn decode_model_key(key: &[u8]) -> Option<String> {
    std::str::from_utf8(key)
        .ok()?
        .strip_prefix("model:")
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_key_round_trips() {
        let key = encode_job_key("job_123");
        assert_eq!(key, b"job:job_123");
        assert_eq!(decode_job_key(&key).unwrap(), "job_123");
    }

    #[test]
    fn dlq_key_sorts_by_request_index() {
        let a = encode_dlq_key("job1", 2);
        let b = encode_dlq_key("job1", 10);
        assert!(a < b, "zero-padded index must sort lexicographically");
    }

    #[test]
    fn dlq_prefix_matches_keys_for_job() {
        let prefix = encode_dlq_prefix("job1");
        let key = encode_dlq_key("job1", 5);
        assert!(key.starts_with(&prefix));
    }

    #[test]
    fn model_key_round_trips() {
        let key = encode_model_key("gemma-3-4b");
        assert_eq!(decode_model_key(&key).unwrap(), "gemma-3-4b");
    }
}
