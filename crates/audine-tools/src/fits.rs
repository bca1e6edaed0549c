//! # FITS 头部
//!
//! 80 字符卡片，每 2880 字节记录 36 张。头部固定保存为两条记录（5760 字节），
//! 曝光结束时原位重写头部不会挪动其后的像素数据。
//!
//! 采集核心只向头部写入/删除关键字，从不读回（[`MetadataSink`]）。

use thiserror::Error;

/// 卡片长度
pub const CARD_LEN: usize = 80;
/// FITS 记录（块）长度
pub const BLOCK_LEN: usize = 2880;
/// 每条记录的卡片数
pub const CARDS_PER_BLOCK: usize = BLOCK_LEN / CARD_LEN;
/// 头部占用的记录数
pub const HEADER_BLOCKS: usize = 2;
/// 头部总字节数
pub const HEADER_LEN: usize = BLOCK_LEN * HEADER_BLOCKS;
/// 可用卡片数（不含 END）
pub const MAX_CARDS: usize = CARDS_PER_BLOCK * HEADER_BLOCKS - 1;

const KEY_LEN: usize = 8;

/// FITS 头部错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FitsError {
    /// 头部已满，卡片被丢弃
    #[error("FITS header full ({max} cards), dropped keyword {key}")]
    HeaderFull { key: String, max: usize },
}

/// 卡片取值
#[derive(Debug, Clone, PartialEq)]
pub enum CardValue {
    Logical(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<bool> for CardValue {
    fn from(v: bool) -> Self {
        CardValue::Logical(v)
    }
}

impl From<i64> for CardValue {
    fn from(v: i64) -> Self {
        CardValue::Integer(v)
    }
}

impl From<i32> for CardValue {
    fn from(v: i32) -> Self {
        CardValue::Integer(i64::from(v))
    }
}

impl From<u32> for CardValue {
    fn from(v: u32) -> Self {
        CardValue::Integer(i64::from(v))
    }
}

impl From<f64> for CardValue {
    fn from(v: f64) -> Self {
        CardValue::Real(v)
    }
}

impl From<&str> for CardValue {
    fn from(v: &str) -> Self {
        CardValue::Text(v.to_string())
    }
}

impl From<String> for CardValue {
    fn from(v: String) -> Self {
        CardValue::Text(v)
    }
}

/// 元数据接收端
///
/// 采集核心在拥有的值变化时写入关键字，不再适用时删除。
pub trait MetadataSink {
    /// 设置关键字（已存在则原位替换）
    fn set(&mut self, key: &str, value: CardValue, comment: &str) -> Result<(), FitsError>;

    /// 删除关键字（不存在时无操作；同名多张时删除最后一张）
    fn erase(&mut self, key: &str);

    /// 追加无值卡片（COMMENT / HISTORY）
    fn append_void(&mut self, key: &str, text: &str) -> Result<(), FitsError>;

    /// 替换最后一张同名无值卡片，不存在时追加
    fn set_void(&mut self, key: &str, text: &str) -> Result<(), FitsError>;
}

/// FITS 头部（卡片列表，不含 END）
#[derive(Debug, Clone, PartialEq)]
pub struct FitsHeader {
    cards: Vec<String>,
}

impl Default for FitsHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl FitsHeader {
    /// 创建带必需关键字的头部
    pub fn new() -> Self {
        let mut header = Self { cards: Vec::new() };
        let mandatory = [
            ("SIMPLE", CardValue::Logical(true), "file conforms to FITS standard"),
            ("BITPIX", CardValue::Integer(16), "number of bits per data pixel"),
            ("NAXIS", CardValue::Integer(2), "number of data axes"),
            ("NAXIS1", CardValue::Integer(0), "length of data axis 1"),
            ("NAXIS2", CardValue::Integer(0), "length of data axis 2"),
        ];
        for (key, value, comment) in mandatory {
            header.cards.push(format_card(key, &value, comment));
        }
        header
            .cards
            .push(format_void("COMMENT", "Written by the Audine acquisition core"));
        header
            .cards
            .push(format_void("COMMENT", "16-bit big-endian samples, row-major"));
        header
    }

    /// 卡片数（不含 END）
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// 按关键字查找卡片原文（从尾部开始）
    pub fn card(&self, key: &str) -> Option<&str> {
        self.find(key).map(|i| self.cards[i].as_str())
    }

    /// 序列化为固定长度字节（头部 + END + 空格填充）
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(HEADER_LEN);
        for card in &self.cards {
            data.extend_from_slice(card.as_bytes());
        }
        data.extend_from_slice(pad_card("END".to_string()).as_bytes());
        data.resize(HEADER_LEN, b' ');
        data
    }

    fn find(&self, key: &str) -> Option<usize> {
        let padded = format!("{:<width$}", truncate_key(key), width = KEY_LEN);
        self.cards
            .iter()
            .rposition(|card| card.as_bytes()[..KEY_LEN] == padded.as_bytes()[..KEY_LEN])
    }

    fn push(&mut self, card: String, key: &str) -> Result<(), FitsError> {
        if self.cards.len() >= MAX_CARDS {
            return Err(FitsError::HeaderFull {
                key: key.to_string(),
                max: MAX_CARDS,
            });
        }
        self.cards.push(card);
        Ok(())
    }
}

impl MetadataSink for FitsHeader {
    fn set(&mut self, key: &str, value: CardValue, comment: &str) -> Result<(), FitsError> {
        let card = format_card(key, &value, comment);
        match self.find(key) {
            Some(i) => {
                self.cards[i] = card;
                Ok(())
            },
            None => self.push(card, key),
        }
    }

    fn erase(&mut self, key: &str) {
        if let Some(i) = self.find(key) {
            self.cards.remove(i);
        }
    }

    fn append_void(&mut self, key: &str, text: &str) -> Result<(), FitsError> {
        self.push(format_void(key, text), key)
    }

    fn set_void(&mut self, key: &str, text: &str) -> Result<(), FitsError> {
        let card = format_void(key, text);
        match self.find(key) {
            Some(i) => {
                self.cards[i] = card;
                Ok(())
            },
            None => self.push(card, key),
        }
    }
}

// ==================== 卡片格式化 ====================

/// 关键字 = 值 / 注释
fn format_card(key: &str, value: &CardValue, comment: &str) -> String {
    let value_field = match value {
        CardValue::Logical(v) => format!("{:>20}", if *v { 'T' } else { 'F' }),
        CardValue::Integer(v) => format!("{:>20}", v),
        CardValue::Real(v) => format!("{:>20}", format_real(*v)),
        CardValue::Text(v) => {
            let quoted = format!("'{:<8}'", v.replace('\'', "''"));
            format!("{:<20}", quoted)
        },
    };
    let mut card = format!("{:<8}= {}", truncate_key(key), value_field);
    if !comment.is_empty() {
        card.push_str(" / ");
        card.push_str(comment);
    }
    pad_card(card)
}

/// 无值卡片（COMMENT / HISTORY）
fn format_void(key: &str, text: &str) -> String {
    pad_card(format!("{:<8}{}", truncate_key(key), text))
}

fn truncate_key(key: &str) -> String {
    key.chars().take(KEY_LEN).collect::<String>().to_ascii_uppercase()
}

/// 非 ASCII 字符替换为 '?'，截断/补齐到 80 字符
fn pad_card(card: String) -> String {
    let mut ascii: String = card
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .take(CARD_LEN)
        .collect();
    while ascii.len() < CARD_LEN {
        ascii.push(' ');
    }
    ascii
}

/// 等价于 C 的 `%g`（6 位有效数字）
fn format_real(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }
    let sci = format!("{:.5e}", value);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if !(-4..6).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    } else {
        let decimals = (5 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, value))
    }
}

fn trim_fraction(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}
