use crate::error::FatError;

/// Space-padded 8.3 name as stored in a directory entry.
pub type ShortName = [u8; 11];

pub const DOT_NAME: ShortName = *b".          ";
pub const DOT_DOT_NAME: ShortName = *b"..         ";

/// Longest textual 8.3 name, `NNNNNNNN.EEE`.
pub const NAME_MAX: usize = 12;

pub type NameString = heapless::String<NAME_MAX>;

/// Encodes `name` as an upper-case 8.3 name.
pub fn encode_short_name(name: &str) -> Result<ShortName, FatError> {
    let bytes = name.as_bytes();
    let (base, ext) = match bytes.iter().position(|&b| b == b'.') {
        Some(dot_idx) => {
            let after = &bytes[dot_idx + 1..];
            if after.contains(&b'.') {
                return Err(FatError::InvalidPath);
            }
            (&bytes[..dot_idx], after)
        }
        None => (bytes, &[][..]),
    };

    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return Err(FatError::InvalidPath);
    }

    let mut out = [b' '; 11];
    for (i, b) in base.iter().enumerate() {
        out[i] = normalize_short_char(*b)?;
    }
    for (i, b) in ext.iter().enumerate() {
        out[8 + i] = normalize_short_char(*b)?;
    }
    Ok(out)
}

fn normalize_short_char(byte: u8) -> Result<u8, FatError> {
    if !(0x21..=0x7E).contains(&byte) || b"|<>^+=?/[];,*\"\\".contains(&byte) {
        return Err(FatError::InvalidPath);
    }
    Ok(byte.to_ascii_uppercase())
}

/// Renders a stored 8.3 name as `NAME.EXT`, dropping padding.
pub fn short_name_to_text(raw: &ShortName) -> NameString {
    let mut out = NameString::new();
    for &b in raw[0..8].iter().take_while(|&&b| b != b' ') {
        let _ = out.push(b as char);
    }
    if raw[8] != b' ' {
        let _ = out.push('.');
        for &b in raw[8..11].iter().take_while(|&&b| b != b' ') {
            let _ = out.push(b as char);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_base_and_extension_upper_case() {
        assert_eq!(&encode_short_name("log.txt").unwrap(), b"LOG     TXT");
        assert_eq!(&encode_short_name("README").unwrap(), b"README     ");
        assert_eq!(&encode_short_name("a~1.b").unwrap(), b"A~1     B  ");
    }

    #[test]
    fn rejects_names_that_do_not_fit_8_3() {
        assert_eq!(encode_short_name(""), Err(FatError::InvalidPath));
        assert_eq!(encode_short_name(".hidden"), Err(FatError::InvalidPath));
        assert_eq!(encode_short_name("toolongname"), Err(FatError::InvalidPath));
        assert_eq!(encode_short_name("a.b.c"), Err(FatError::InvalidPath));
        assert_eq!(encode_short_name("file.text"), Err(FatError::InvalidPath));
        assert_eq!(encode_short_name("sp ace"), Err(FatError::InvalidPath));
        assert_eq!(encode_short_name("a*b"), Err(FatError::InvalidPath));
        assert_eq!(encode_short_name(".."), Err(FatError::InvalidPath));
    }

    #[test]
    fn renders_padded_names() {
        assert_eq!(short_name_to_text(b"LOG     TXT").as_str(), "LOG.TXT");
        assert_eq!(short_name_to_text(b"DATA       ").as_str(), "DATA");
        assert_eq!(short_name_to_text(b"ABCDEFGHIJK").as_str(), "ABCDEFGH.IJK");
    }
}
