use std::collections::HashMap;
use std::str::FromStr;

pub use proc_macro2::{Delimiter, TokenStream, TokenTree};

use crate::error::{Error, Result};
use crate::variables::Variables;

/// pseudo-json value written in attribute syntax, eg:
/// `{ domain_name: "dev2.example.com", aliases: ["a", "b"], website: {} }`
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Str(String),
    List(Vec<AttributeValue>),
    Map(HashMap<String, AttributeValue>),
}

impl AttributeValue {
    pub fn assert_str(self, key: &str) -> Result<String> {
        match self {
            AttributeValue::Str(s) => Ok(s),
            x => Err(Error::invalid_attribute(key, format!("expected string, found {:?}", x))),
        }
    }
    pub fn assert_map(self, key: &str) -> Result<HashMap<String, AttributeValue>> {
        match self {
            AttributeValue::Map(m) => Ok(m),
            x => Err(Error::invalid_attribute(key, format!("expected map, found {:?}", x))),
        }
    }
    pub fn assert_list(self, key: &str) -> Result<Vec<AttributeValue>> {
        match self {
            AttributeValue::List(l) => Ok(l),
            x => Err(Error::invalid_attribute(key, format!("expected list, found {:?}", x))),
        }
    }
    pub fn assert_bool(self, key: &str) -> Result<bool> {
        let s = self.assert_str(key)?;
        match s.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(Error::invalid_attribute(key, format!("expected true or false, found {:?}", s))),
        }
    }
}

/// parse a whole attribute string. an empty input is an empty map.
pub fn parse_attribute_str(input: &str, vars: &Variables) -> Result<AttributeValue> {
    let stream = TokenStream::from_str(input)
        .map_err(|e| Error::Parse(format!("Failed to tokenize attributes {:?}\n{}", input, e)))?;
    parse_attributes(stream, vars)
}

pub fn parse_attributes(attr: TokenStream, vars: &Variables) -> Result<AttributeValue> {
    let mut iter = attr.into_iter();
    let first = match iter.next() {
        Some(n) => n,
        None => return Ok(AttributeValue::Map(HashMap::new())),
    };
    let value = get_attribute_value(first, vars)?;
    if let Some(extra) = iter.next() {
        return Err(Error::Parse(format!("Unexpected trailing token {} after attribute value", extra)));
    }
    Ok(value)
}

/// the value of a literal token. `"..."` is unescaped, `r"..."`/`r#"..."#` is
/// taken as is, numbers are kept as written. byte and char literals are rejected.
fn literal_string(l: &proc_macro2::Literal) -> Result<String> {
    let s = l.to_string();
    if let Some(raw) = s.strip_prefix('r') {
        let hashes = raw.len() - raw.trim_start_matches('#').len();
        let fence = "#".repeat(hashes);
        return raw[hashes..]
            .strip_prefix('"')
            .and_then(|r| r.strip_suffix(&format!("\"{fence}")))
            .map(str::to_string)
            .ok_or_else(|| Error::Parse(format!("Malformed raw string literal {s}")));
    }
    if let Some(quoted) = s.strip_prefix('"').and_then(|q| q.strip_suffix('"')) {
        return unescape(quoted).map_err(|e| Error::Parse(format!("Invalid escape in string literal {s}: {e}")));
    }
    if s.starts_with(|c: char| matches!(c, 'b' | 'c' | '\'')) {
        return Err(Error::Parse(format!("Unsupported literal {s}. Use a plain \"string\"")));
    }
    Ok(s)
}

fn unescape(s: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('u') => {
                if chars.next() != Some('{') {
                    return Err("expected '{' after \\u".into());
                }
                let hex: String = chars.by_ref().take_while(|c| *c != '}').collect();
                let code = u32::from_str_radix(&hex, 16).map_err(|e| format!("\\u{{{hex}}}: {e}"))?;
                out.push(char::from_u32(code).ok_or_else(|| format!("\\u{{{hex}}} is not a char"))?);
            }
            // line continuation
            Some('\n') => {
                while chars.peek().map(|c| c.is_whitespace()).unwrap_or(false) {
                    chars.next();
                }
            }
            Some(x) => return Err(format!("unknown escape \\{x}")),
            None => return Err("trailing backslash".into()),
        }
    }
    Ok(out)
}

fn expect_punct(next: Option<TokenTree>, c: char, context: &str) -> Result<()> {
    match next {
        Some(TokenTree::Punct(p)) if p.as_char() == c => Ok(()),
        Some(x) => Err(Error::Parse(format!("Expected punctuation '{c}' {context}. Instead found {x}"))),
        None => Err(Error::Parse(format!("Expected punctuation '{c}' {context}. Instead found end of input"))),
    }
}

pub fn get_attribute_value(token: TokenTree, vars: &Variables) -> Result<AttributeValue> {
    match token {
        TokenTree::Group(g) => match g.delimiter() {
            Delimiter::Brace => {
                let mut out = HashMap::new();
                let mut iter = g.stream().into_iter().peekable();
                while let Some(next) = iter.next() {
                    let name = match next {
                        TokenTree::Ident(i) => i.to_string(),
                        TokenTree::Literal(l) => literal_string(&l)?,
                        x => {
                            return Err(Error::Parse(format!("Expected an identifier in attribute value map. Instead found {x}")));
                        }
                    };
                    expect_punct(iter.next(), ':', &format!("after attribute key {:?}", name))?;
                    let value_token = iter.next().ok_or_else(|| {
                        Error::Parse(format!("Missing value for attribute key {:?}", name))
                    })?;
                    let val = get_attribute_value(value_token, vars)?;
                    out.insert(name, val);
                    if iter.peek().is_some() {
                        expect_punct(iter.next(), ',', "after attribute value")?;
                    }
                }
                Ok(AttributeValue::Map(out))
            }
            Delimiter::Bracket => {
                let mut out = vec![];
                let mut iter = g.stream().into_iter().peekable();
                while let Some(next) = iter.next() {
                    out.push(get_attribute_value(next, vars)?);
                    if iter.peek().is_some() {
                        expect_punct(iter.next(), ',', "in attribute value list")?;
                    }
                }
                Ok(AttributeValue::List(out))
            }
            _ => Err(Error::Parse(format!("Attribute value is a group. Expected delimiter {{}} or []. Instead found {}", g))),
        },
        // bare identifiers are either booleans or loaded variables
        TokenTree::Ident(id) => {
            let id_key = id.to_string();
            if id_key == "true" || id_key == "false" {
                return Ok(AttributeValue::Str(id_key));
            }
            match vars.get(&id_key) {
                Some(val) => Ok(AttributeValue::Str(val.to_string())),
                None => Err(Error::Parse(format!(
                    "Failed to find value for '{id_key}'. Make sure it is set in your .env file. Or if this value is meant to be used as is, surround it in double quotes like \"{id_key}\""
                ))),
            }
        }
        TokenTree::Literal(l) => Ok(AttributeValue::Str(literal_string(&l)?)),
        TokenTree::Punct(p) => Err(Error::Parse(format!("Unexpected punctuation in attribute value {:?}", p.as_char()))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(s: &str) -> AttributeValue {
        parse_attribute_str(s, &Variables::new()).unwrap()
    }

    #[test]
    fn empty_input_is_empty_map() {
        assert_eq!(parse(""), AttributeValue::Map(HashMap::new()));
    }

    #[test]
    fn parses_nested_values() {
        let val = parse(r#"{ name: "bucket", tags: ["a", "b",], website: { index_document: "index.html" }, "quoted-key": "x" }"#);
        let mut map = val.assert_map("root").unwrap();
        assert_eq!(map.remove("name").unwrap().assert_str("name").unwrap(), "bucket");
        let tags = map.remove("tags").unwrap().assert_list("tags").unwrap();
        assert_eq!(tags, vec![AttributeValue::Str("a".into()), AttributeValue::Str("b".into())]);
        let mut website = map.remove("website").unwrap().assert_map("website").unwrap();
        assert_eq!(website.remove("index_document"), Some(AttributeValue::Str("index.html".into())));
        assert_eq!(map.remove("quoted-key"), Some(AttributeValue::Str("x".into())));
    }

    #[test]
    fn idents_resolve_to_variables() {
        let mut vars = Variables::new();
        vars.set("DOMAIN_NAME", "dev2.example.com");
        let val = parse_attribute_str("{ domain_name: DOMAIN_NAME, enabled: true }", &vars).unwrap();
        let mut map = val.assert_map("root").unwrap();
        assert_eq!(map.remove("domain_name").unwrap().assert_str("d").unwrap(), "dev2.example.com");
        assert!(map.remove("enabled").unwrap().assert_bool("enabled").unwrap());
    }

    #[test]
    fn unknown_ident_is_an_error() {
        let err = parse_attribute_str("{ domain_name: NOPE }", &Variables::new()).unwrap_err();
        assert!(err.to_string().contains("NOPE"));
    }

    #[test]
    fn missing_colon_is_an_error() {
        assert!(parse_attribute_str("{ domain_name \"x\" }", &Variables::new()).is_err());
        assert!(parse_attribute_str("{ a: \"x\" b: \"y\" }", &Variables::new()).is_err());
    }

    #[test]
    fn string_escapes_are_decoded() {
        let mut map = parse(r#"{ a: "line\nnext", b: "tab\there", c: "quote \" and \\", d: "\u{e9}t\u{e9}" }"#)
            .assert_map("root")
            .unwrap();
        assert_eq!(map.remove("a"), Some(AttributeValue::Str("line\nnext".into())));
        assert_eq!(map.remove("b"), Some(AttributeValue::Str("tab\there".into())));
        assert_eq!(map.remove("c"), Some(AttributeValue::Str("quote \" and \\".into())));
        assert_eq!(map.remove("d"), Some(AttributeValue::Str("été".into())));
    }

    #[test]
    fn raw_strings_lose_their_prefix() {
        let mut map = parse(r###"{ a: r"C:\sites", b: r#"say "hi""# }"###).assert_map("root").unwrap();
        assert_eq!(map.remove("a"), Some(AttributeValue::Str("C:\\sites".into())));
        assert_eq!(map.remove("b"), Some(AttributeValue::Str("say \"hi\"".into())));
    }

    #[test]
    fn numbers_pass_through_and_byte_strings_are_rejected() {
        let mut map = parse("{ ttl: 300 }").assert_map("root").unwrap();
        assert_eq!(map.remove("ttl"), Some(AttributeValue::Str("300".into())));
        assert!(parse_attribute_str(r#"{ a: b"bytes" }"#, &Variables::new()).is_err());
        assert!(parse_attribute_str("{ a: 'c' }", &Variables::new()).is_err());
    }
}
