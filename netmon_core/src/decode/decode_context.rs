use super::error::DecodeError;

/// 单个捕获会话内的解码统计，只由会话线程自己修改
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct DecodeStats {
    pub decoded: u64,
    /// 所有解码失败的帧（包含下面两类）
    pub malformed: u64,
    pub truncated: u64,
    pub non_ip: u64,
}

impl DecodeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self) {
        self.decoded += 1;
    }

    pub fn record_error(&mut self, err: &DecodeError) {
        self.malformed += 1;
        match err {
            DecodeError::Truncated { .. } => self.truncated += 1,
            DecodeError::UnsupportedEtherType { .. } => self.non_ip += 1,
            _ => {}
        }
    }

    pub fn total(&self) -> u64 {
        self.decoded + self.malformed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::HeaderLayer;

    #[test]
    fn test_record_error_buckets() {
        let mut stats = DecodeStats::new();
        stats.record_success();
        stats.record_error(&DecodeError::Truncated {
            layer: HeaderLayer::Network,
            required: 34,
            actual: 20,
        });
        stats.record_error(&DecodeError::UnsupportedEtherType { ethertype: 0x0806 });
        stats.record_error(&DecodeError::InvalidHeaderLength { ihl: 2 });

        assert_eq!(stats.decoded, 1);
        assert_eq!(stats.malformed, 3);
        assert_eq!(stats.truncated, 1);
        assert_eq!(stats.non_ip, 1);
        assert_eq!(stats.total(), 4);
    }
}
