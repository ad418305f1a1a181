//! GSM 03.38 默认字母表与扩展表
//!
//! 只负责字符到 septet 的映射，不做比特打包。

/// 扩展表转义符
pub const ESCAPE: u8 = 0x1B;

/// 基本表，下标即 septet 值；0x1B 为转义符，不对应任何字符
const BASIC: [char; 128] = [
    '@', '£', '$', '¥', 'è', 'é', 'ù', 'ì', 'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å',
    'Δ', '_', 'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ', 'Σ', 'Θ', 'Ξ', '\u{1B}', 'Æ', 'æ', 'ß', 'É',
    ' ', '!', '"', '#', '¤', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/',
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?',
    '¡', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O',
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '§',
    '¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o',
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'ä', 'ö', 'ñ', 'ü', 'à',
];

const EXTENSION: [(char, u8); 10] = [
    ('\u{0C}', 0x0A),
    ('^', 0x14),
    ('{', 0x28),
    ('}', 0x29),
    ('\\', 0x2F),
    ('[', 0x3C),
    ('~', 0x3D),
    (']', 0x3E),
    ('|', 0x40),
    ('€', 0x65),
];

fn basic_code(c: char) -> Option<u8> {
    BASIC
        .iter()
        .position(|&b| b == c)
        .filter(|&code| code as u8 != ESCAPE)
        .map(|code| code as u8)
}

fn extension_code(c: char) -> Option<u8> {
    EXTENSION
        .iter()
        .find(|(ext, _)| *ext == c)
        .map(|(_, code)| *code)
}

/// 字符在默认字母表下占用的 septet 数，不可编码时返回 None
pub fn septet_len(c: char) -> Option<usize> {
    if basic_code(c).is_some() {
        Some(1)
    } else if extension_code(c).is_some() {
        Some(2)
    } else {
        None
    }
}

pub fn is_encodable(text: &str) -> bool {
    text.chars().all(|c| septet_len(c).is_some())
}

/// 将字符追加为 septet 序列（每个 septet 一个字节）
pub fn encode_char(c: char, out: &mut Vec<u8>) -> bool {
    if let Some(code) = basic_code(c) {
        out.push(code);
        true
    } else if let Some(code) = extension_code(c) {
        out.push(ESCAPE);
        out.push(code);
        true
    } else {
        false
    }
}

pub fn encode(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        if !encode_char(c, &mut out) {
            return None;
        }
    }
    Some(out)
}

/// 解码 septet 序列，遇到非法值或孤立的转义符返回 None
pub fn decode(septets: &[u8]) -> Option<String> {
    let mut text = String::with_capacity(septets.len());
    let mut iter = septets.iter();
    while let Some(&septet) = iter.next() {
        if septet == ESCAPE {
            let &code = iter.next()?;
            let (c, _) = EXTENSION.iter().find(|(_, ext)| *ext == code)?;
            text.push(*c);
        } else {
            text.push(*BASIC.get(septet as usize)?);
        }
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_and_extension_lengths() {
        assert_eq!(septet_len('A'), Some(1));
        assert_eq!(septet_len('@'), Some(1));
        assert_eq!(septet_len('Δ'), Some(1));
        assert_eq!(septet_len('€'), Some(2));
        assert_eq!(septet_len('{'), Some(2));
        assert_eq!(septet_len('中'), None);
        assert_eq!(septet_len('\u{1B}'), None);
    }

    #[test]
    fn test_encode_uses_escape_for_extension() {
        assert_eq!(encode("@A€").unwrap(), vec![0x00, 0x41, ESCAPE, 0x65]);
        assert!(encode("emoji 😀").is_none());
    }

    #[test]
    fn test_decode_reverses_encode() {
        let text = "Hello [world] ~ 5€ Ñoño";
        assert_eq!(decode(&encode(text).unwrap()).unwrap(), text);
        assert!(decode(&[ESCAPE]).is_none());
        assert!(decode(&[0x80]).is_none());
    }

    #[test]
    fn test_is_encodable() {
        assert!(is_encodable("plain ascii text 123"));
        assert!(!is_encodable("naïve"));
    }
}
