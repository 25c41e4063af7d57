// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Splitting of `k1=v1,k2=v2` option strings, the inverse of
//! [`crate::builder::OptLine`].

use crate::Error;
use crate::Result;

/// One parsed sub-option. `value` is `None` for bare flags (`server`,
/// `nowait`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Option<String>,
}

impl KeyValue {
    pub fn value_or_empty(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

/// A parsed keyword list with typed accessors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyValues {
    entries: Vec<KeyValue>,
}

impl KeyValues {
    /// Splits on unescaped commas; `,,` inside a value is a literal
    /// comma. Empty values (`key=`) are only allowed when the caller says
    /// so; empty keys never are.
    pub fn parse(s: &str, allow_empty_value: bool) -> Result<KeyValues> {
        let mut entries = Vec::new();
        for field in split_fields(s) {
            if field.is_empty() {
                continue;
            }
            let (key, value) = match field.split_once('=') {
                Some((k, v)) => (k.to_owned(), Some(v.to_owned())),
                None => (field.clone(), None),
            };
            if key.is_empty() {
                return Err(Error::Parse(format!("malformed keyword '{}'", field)));
            }
            if !allow_empty_value {
                if let Some(v) = &value {
                    if v.is_empty() {
                        return Err(Error::Parse(format!("keyword '{}' has no value", key)));
                    }
                }
            }
            entries.push(KeyValue { key, value });
        }
        Ok(KeyValues { entries })
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.entries.iter()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value_or_empty())
    }

    pub fn has_flag(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|_| Error::Parse(format!("keyword '{}' wants a number, got '{}'", key, v))),
        }
    }

    pub fn get_u32(&self, key: &str) -> Result<Option<u32>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|_| Error::Parse(format!("keyword '{}' wants a number, got '{}'", key, v))),
        }
    }

    pub fn get_onoff(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some("on") | Some("yes") => Ok(Some(true)),
            Some("off") | Some("no") => Ok(Some(false)),
            Some(v) => Err(Error::Parse(format!(
                "keyword '{}' wants on/off, got '{}'",
                key, v
            ))),
        }
    }
}

/// Splits on single commas, collapsing doubled ones into the value.
fn split_fields(s: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ',' {
            if chars.peek() == Some(&',') {
                chars.next();
                current.push(',');
            } else {
                fields.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_keywords() {
        let kv = KeyValues::parse("file=/img,if=none,id=drive-virtio-disk0", false).unwrap();
        assert_eq!(kv.get("file"), Some("/img"));
        assert_eq!(kv.get("if"), Some("none"));
        assert_eq!(kv.get("id"), Some("drive-virtio-disk0"));
        assert_eq!(kv.get("missing"), None);
    }

    #[test]
    fn doubled_comma_is_literal() {
        let kv = KeyValues::parse("file=/tmp/a,,b,format=raw", false).unwrap();
        assert_eq!(kv.get("file"), Some("/tmp/a,b"));
        assert_eq!(kv.get("format"), Some("raw"));
    }

    #[test]
    fn trailing_escape_round_trips() {
        use crate::builder::OptLine;
        let mut line = OptLine::with("x");
        line.add_keyword("file", "a,b").add_keyword("id", "d");
        let s = line.finish();
        let kv = KeyValues::parse(&s, false).unwrap();
        assert_eq!(kv.get("file"), Some("a,b"));
        assert_eq!(kv.get("id"), Some("d"));
    }

    #[test]
    fn flags_have_no_value() {
        let kv = KeyValues::parse("socket,id=c,server,nowait", false).unwrap();
        assert!(kv.has_flag("server"));
        assert!(kv.has_flag("nowait"));
        assert_eq!(kv.get("id"), Some("c"));
    }

    #[test]
    fn empty_value_rejected_unless_allowed() {
        assert!(KeyValues::parse("file=,if=none", false).is_err());
        let kv = KeyValues::parse("file=,if=none", true).unwrap();
        assert_eq!(kv.get("file"), Some(""));
    }

    #[test]
    fn numeric_accessors() {
        let kv = KeyValues::parse("bps=1000,port=5900", false).unwrap();
        assert_eq!(kv.get_u64("bps").unwrap(), Some(1000));
        assert_eq!(kv.get_u32("port").unwrap(), Some(5900));
        let kv = KeyValues::parse("bps=abc", false).unwrap();
        assert!(kv.get_u64("bps").is_err());
    }

    #[test]
    fn onoff_accessor() {
        let kv = KeyValues::parse("readonly=on,mf=off", false).unwrap();
        assert_eq!(kv.get_onoff("readonly").unwrap(), Some(true));
        assert_eq!(kv.get_onoff("mf").unwrap(), Some(false));
        assert_eq!(kv.get_onoff("absent").unwrap(), None);
    }
}
