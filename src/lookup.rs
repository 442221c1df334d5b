//! # 标签取值表
//!
//! 把请求方法和状态码转换成标签值。常见取值在第一次使用时预先计算好，之后只读；
//! 其余取值走通用转换，原样保留，不会被替换成 "unknown" 之类的占位值。

use std::{borrow::Cow, collections::HashMap, sync::LazyLock};

const METHODS: [(&str, &str); 9] = [
    ("GET", "get"),
    ("HEAD", "head"),
    ("POST", "post"),
    ("PUT", "put"),
    ("PATCH", "patch"),
    ("DELETE", "delete"),
    ("CONNECT", "connect"),
    ("OPTIONS", "options"),
    ("TRACE", "trace"),
];

static METHOD_TABLE: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    METHODS
        .iter()
        .flat_map(|&(upper, lower)| [(upper, lower), (lower, lower)])
        .collect()
});

/// IANA 注册的状态码
const CODES: [u16; 62] = [
    // 100
    100, 101, 102, 103, //
    // 200
    200, 201, 202, 203, 204, 205, 206, 207, 208, 226, //
    // 300
    300, 301, 302, 303, 304, 305, 307, 308, //
    // 400
    400, 401, 402, 403, 404, 405, 406, 407, 408, 409, 410, 411, 412, 413, 414, 415, 416, 417, 418, 421, 422, 423,
    424, 425, 426, 428, 429, 431, 451, //
    // 500
    500, 501, 502, 503, 504, 505, 506, 507, 508, 510, 511,
];

static CODE_TABLE: LazyLock<HashMap<u16, String>> =
    LazyLock::new(|| CODES.iter().map(|code| (*code, code.to_string())).collect());

/// 请求方法的标签值，小写
pub fn lookup_method(method: &str) -> Cow<'static, str> {
    match METHOD_TABLE.get(method) {
        Some(lower) => Cow::Borrowed(*lower),
        None => Cow::Owned(method.to_lowercase()),
    }
}

/// 状态码的标签值，十进制字符串
pub fn lookup_code(code: u16) -> Cow<'static, str> {
    match CODE_TABLE.get(&code) {
        Some(s) => Cow::Borrowed(s.as_str()),
        None => Cow::Owned(code.to_string()),
    }
}
