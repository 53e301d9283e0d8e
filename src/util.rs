use std::ffi::CStr;

const GIB: f64 = (1024 * 1024 * 1024) as f64;

// Render a byte count as GiB with two decimals, "80.00".
pub fn gib(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / GIB)
}

// Copy a NUL-terminated C string out of a fixed-size buffer.  A buffer without a terminator is
// taken in its entirety; invalid UTF-8 is replaced rather than rejected.
pub fn cstrdup(s: &[cty::c_char]) -> String {
    let bytes = s.iter().map(|c| *c as u8).collect::<Vec<u8>>();
    match CStr::from_bytes_until_nul(&bytes) {
        Ok(cs) => cs.to_string_lossy().into_owned(),
        Err(_) => String::from_utf8_lossy(&bytes).into_owned(),
    }
}

// Insert \ before " and \
// Insert escape sequences for well-known control chars.
// Translate all other control chars to spaces (it's possible to do better).
pub fn json_quote(s: &str) -> String {
    let mut t = "".to_string();
    for c in s.chars() {
        match c {
            '"' | '\\' => {
                t.push('\\');
                t.push(c);
            }
            '\n' => t.push_str("\\n"),
            '\r' => t.push_str("\\r"),
            '\t' => t.push_str("\\t"),
            _ctl if c < ' ' => t.push(' '),
            _ => t.push(c),
        }
    }
    t
}

#[test]
pub fn json_quote_test() {
    assert!(&json_quote("abcde") == "abcde");
    assert!(&json_quote(r#"abc\de"#) == r#"abc\\de"#);
    assert!(&json_quote(r#"abc"de"#) == r#"abc\"de"#);
    assert!(&json_quote("abc\nde") == r#"abc\nde"#);
    assert!(&json_quote("abc\u{0008}de") == r#"abc de"#);
}

#[test]
pub fn gib_test() {
    assert!(gib(0) == "0.00");
    assert!(gib(80 * 1024 * 1024 * 1024) == "80.00");
    assert!(gib(3 * 512 * 1024 * 1024) == "1.50");
}

#[test]
pub fn cstrdup_test() {
    let mut buf: [cty::c_char; 16] = [0; 16];
    for (i, c) in "0000:07:00.0".bytes().enumerate() {
        buf[i] = c as cty::c_char;
    }
    assert!(cstrdup(&buf) == "0000:07:00.0");
    let full: [cty::c_char; 3] = [b'a' as cty::c_char, b'b' as cty::c_char, b'c' as cty::c_char];
    assert!(cstrdup(&full) == "abc");
}
