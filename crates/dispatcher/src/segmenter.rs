use sms_core::SegmentationConfig;
use sms_domain::{Encoding, MessagePart, Payload};
use sms_errors::{SmsError, SmsResult};

use crate::gsm_alphabet;

/// 消息分段器
///
/// 编码方式对整条消息只判定一次：全部字符可用默认字母表表示时使用 GSM7，
/// 否则使用 UCS2。分段按字符边界从左到右贪心切分，代理对与扩展表字符不会被拆开。
/// 没有内部可变状态，相同输入总是得到相同的分段结果。
#[derive(Debug, Clone)]
pub struct MessageSegmenter {
    config: SegmentationConfig,
}

impl MessageSegmenter {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    pub fn detect_encoding(text: &str) -> Encoding {
        if gsm_alphabet::is_encodable(text) {
            Encoding::Gsm7
        } else {
            Encoding::Ucs2
        }
    }

    /// 每个分段可容纳的编码单元数（GSM7 为 septet，UCS2 为 UTF-16 码元）
    pub fn capacity(&self, encoding: Encoding, multipart: bool) -> usize {
        let header = if multipart {
            self.config.concat_header_octets
        } else {
            0
        };
        match encoding {
            Encoding::Gsm7 => {
                // 用户数据头按 septet 对齐
                let header_septets = (header * 8).div_ceil(7);
                (self.config.max_user_data_octets * 8 / 7).saturating_sub(header_septets)
            }
            Encoding::Ucs2 => self.config.max_user_data_octets.saturating_sub(header) / 2,
            Encoding::Binary => self
                .config
                .max_user_data_octets
                .saturating_sub(self.config.port_header_octets),
        }
    }

    pub fn segment_payload(&self, payload: &Payload) -> SmsResult<Vec<MessagePart>> {
        match payload {
            Payload::Text(text) => self.segment(text),
            Payload::Data {
                bytes,
                destination_port,
            } => self.segment_data(bytes, *destination_port),
        }
    }

    pub fn segment(&self, text: &str) -> SmsResult<Vec<MessagePart>> {
        if text.is_empty() {
            return Err(SmsError::invalid_argument("待分段的文本不能为空"));
        }

        let encoding = Self::detect_encoding(text);
        let units: Vec<(char, usize)> = text
            .chars()
            .map(|c| (c, Self::unit_len(c, encoding)))
            .collect();
        let total_units: usize = units.iter().map(|(_, len)| len).sum();

        let single_capacity = self.capacity(encoding, false);
        let chunks: Vec<String> = if total_units <= single_capacity {
            vec![text.to_string()]
        } else {
            self.split(&units, self.capacity(encoding, true))?
        };

        let total = chunks.len();
        Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| MessagePart {
                index,
                total,
                encoding,
                payload: Self::encode(&chunk, encoding),
                text: Some(chunk),
                destination_port: None,
            })
            .collect())
    }

    /// 二进制数据不分段，必须能放进一条短信
    pub fn segment_data(&self, bytes: &[u8], destination_port: Option<u16>) -> SmsResult<Vec<MessagePart>> {
        if bytes.is_empty() {
            return Err(SmsError::invalid_argument("数据内容不能为空"));
        }

        let limit = match destination_port {
            Some(_) => self.capacity(Encoding::Binary, false),
            None => self.config.max_user_data_octets,
        };
        if bytes.len() > limit {
            return Err(SmsError::invalid_argument(format!(
                "数据长度 {} 超过单条短信上限 {}",
                bytes.len(),
                limit
            )));
        }

        Ok(vec![MessagePart {
            index: 0,
            total: 1,
            encoding: Encoding::Binary,
            text: None,
            payload: bytes.to_vec(),
            destination_port,
        }])
    }

    fn split(&self, units: &[(char, usize)], capacity: usize) -> SmsResult<Vec<String>> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut used = 0;

        for &(c, len) in units {
            if len > capacity {
                return Err(SmsError::invalid_argument(format!(
                    "分段容量 {capacity} 无法容纳字符 {c:?}"
                )));
            }
            if used + len > capacity {
                chunks.push(std::mem::take(&mut current));
                used = 0;
            }
            current.push(c);
            used += len;
        }
        if !current.is_empty() {
            chunks.push(current);
        }

        Ok(chunks)
    }

    fn unit_len(c: char, encoding: Encoding) -> usize {
        match encoding {
            Encoding::Gsm7 => gsm_alphabet::septet_len(c).unwrap_or(1),
            _ => c.len_utf16(),
        }
    }

    fn encode(chunk: &str, encoding: Encoding) -> Vec<u8> {
        match encoding {
            Encoding::Gsm7 => gsm_alphabet::encode(chunk).unwrap_or_default(),
            _ => chunk.encode_utf16().flat_map(|unit| unit.to_be_bytes()).collect(),
        }
    }
}

impl Default for MessageSegmenter {
    fn default() -> Self {
        Self::new(SegmentationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ascii(len: usize) -> String {
        "abcdefghij".chars().cycle().take(len).collect()
    }

    fn lengths(parts: &[MessagePart]) -> Vec<usize> {
        parts
            .iter()
            .map(|p| p.text.as_ref().unwrap().chars().count())
            .collect()
    }

    #[test]
    fn test_default_capacities() {
        let segmenter = MessageSegmenter::default();
        assert_eq!(segmenter.capacity(Encoding::Gsm7, false), 160);
        assert_eq!(segmenter.capacity(Encoding::Gsm7, true), 153);
        assert_eq!(segmenter.capacity(Encoding::Ucs2, false), 70);
        assert_eq!(segmenter.capacity(Encoding::Ucs2, true), 67);
        assert_eq!(segmenter.capacity(Encoding::Binary, false), 134);
    }

    #[test]
    fn test_320_ascii_chars_with_concat_header() {
        let segmenter = MessageSegmenter::default();
        let parts = segmenter.segment(&ascii(320)).unwrap();
        assert_eq!(lengths(&parts), vec![153, 153, 14]);
        assert!(parts.iter().all(|p| p.total == 3 && p.encoding == Encoding::Gsm7));
        assert_eq!(parts.iter().map(|p| p.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_320_ascii_chars_without_header_budget() {
        let segmenter = MessageSegmenter::new(SegmentationConfig {
            concat_header_octets: 0,
            ..Default::default()
        });
        let parts = segmenter.segment(&ascii(320)).unwrap();
        assert_eq!(lengths(&parts), vec![160, 160]);
    }

    #[test]
    fn test_single_part_boundary() {
        let segmenter = MessageSegmenter::default();
        assert_eq!(segmenter.segment(&ascii(160)).unwrap().len(), 1);
        assert_eq!(segmenter.segment(&ascii(161)).unwrap().len(), 2);
    }

    #[test]
    fn test_extension_chars_count_double() {
        let segmenter = MessageSegmenter::default();
        // 80 个 € 占 160 septet，正好一条
        let parts = segmenter.segment(&"€".repeat(80)).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].payload.len(), 160);

        let parts = segmenter.segment(&"€".repeat(81)).unwrap();
        assert_eq!(parts.len(), 2);
        // 153 为奇数，扩展字符不会被拆到两个分段
        assert_eq!(parts[0].payload.len(), 152);
    }

    #[test]
    fn test_unicode_text_uses_ucs2() {
        let segmenter = MessageSegmenter::default();
        let text = "短信".repeat(40);
        let parts = segmenter.segment(&text).unwrap();
        assert_eq!(parts[0].encoding, Encoding::Ucs2);
        assert_eq!(lengths(&parts), vec![67, 13]);
        assert_eq!(parts[1].payload.len(), 26);
        assert_eq!(&parts[0].payload[..2], &[0x77, 0xED]);
    }

    #[test]
    fn test_surrogate_pairs_never_split() {
        let segmenter = MessageSegmenter::default();
        // 每个表情占 2 个 UTF-16 码元，67 为奇数
        let text = "😀".repeat(40);
        let parts = segmenter.segment(&text).unwrap();
        assert_eq!(lengths(&parts), vec![33, 7]);
        for part in &parts {
            assert!(part.payload.len() / 2 <= segmenter.capacity(Encoding::Ucs2, true));
        }
        let joined: String = parts.iter().map(|p| p.text.clone().unwrap()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_one_wide_char_switches_whole_message() {
        let segmenter = MessageSegmenter::default();
        let text = format!("{}中", ascii(100));
        let parts = segmenter.segment(&text).unwrap();
        assert!(parts.iter().all(|p| p.encoding == Encoding::Ucs2));
        assert_eq!(lengths(&parts), vec![67, 34]);
    }

    #[test]
    fn test_empty_text_rejected() {
        let err = MessageSegmenter::default().segment("").unwrap_err();
        assert!(matches!(err, SmsError::InvalidArgument(_)));
    }

    #[test]
    fn test_binary_data_limits() {
        let segmenter = MessageSegmenter::default();
        let parts = segmenter.segment_data(&[0u8; 134], Some(2948)).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].encoding, Encoding::Binary);
        assert_eq!(parts[0].destination_port, Some(2948));

        let err = segmenter.segment_data(&[0u8; 135], Some(2948)).unwrap_err();
        assert!(matches!(err, SmsError::InvalidArgument(_)));

        assert!(segmenter.segment_data(&[0u8; 140], None).is_ok());
        assert!(segmenter.segment_data(&[], None).is_err());
    }

    #[test]
    fn test_segment_is_deterministic() {
        let segmenter = MessageSegmenter::default();
        let text = format!("{}€{}", ascii(200), ascii(200));
        assert_eq!(segmenter.segment(&text).unwrap(), segmenter.segment(&text).unwrap());
    }
}
