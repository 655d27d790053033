//! The built-in rule catalogue.
//!
//! Basic rules map to comparison operators; everything else maps to a named
//! predicate in the runtime support package. The predicates themselves are
//! external collaborators: the catalogue records only their call contracts.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::diagnostics::ErrorKind;
use crate::tag::{ArgType, Rule, RuleArg};

use super::{
    BasicCheck, BasicRule, BoolConn, CompareOp, FuncIdent, FuncRule, JoinOp, ParamKind, RuleSpec,
};

/// Import path of the runtime predicate package consumed by generated code.
pub const PREDICATE_PKG: &str = "verigen/check";

/// Import path of the host standard-library strings package.
pub const STRINGS_PKG: &str = "strings";

use ParamKind::{Bool as B, Int as I, String as S};

fn basic(op: CompareOp, join: Option<JoinOp>, check: BasicCheck) -> RuleSpec {
    RuleSpec::Basic(BasicRule { op, join, check })
}

fn pred(name: &str, params: &[ParamKind]) -> FuncRule {
    FuncRule {
        func: FuncIdent::new(PREDICATE_PKG, name),
        params: params.to_vec(),
        is_variadic: false,
        conn: BoolConn::None,
        use_raw_string: false,
        check: None,
        is_custom: false,
    }
}

impl FuncRule {
    fn variadic(mut self) -> Self {
        self.is_variadic = true;
        self
    }

    fn conn(mut self, conn: BoolConn) -> Self {
        self.conn = conn;
        self
    }

    fn raw(mut self) -> Self {
        self.use_raw_string = true;
        self
    }

    fn check(mut self, check: super::ArgCheck) -> Self {
        self.check = Some(check);
        self
    }

    fn in_pkg(mut self, pkg_path: &str) -> Self {
        self.func.pkg_path = pkg_path.to_string();
        self
    }
}

pub(crate) static DEFAULT_RULES: Lazy<HashMap<&'static str, RuleSpec>> = Lazy::new(|| {
    use BasicCheck::{Comparable, Length, Ordered, Range};
    use CompareOp::{Eql, Geq, Gtr, Leq, Lss, Neq};

    let mut m = HashMap::new();

    m.insert("isvalid", RuleSpec::IsValid);
    m.insert("enum", RuleSpec::Enum);

    // basic comparison rules; the operator is the failure condition
    m.insert("eq", basic(Neq, Some(JoinOp::And), Comparable));
    m.insert("ne", basic(Eql, Some(JoinOp::Or), Comparable));
    m.insert("gt", basic(Leq, None, Ordered));
    m.insert("lt", basic(Geq, None, Ordered));
    m.insert("gte", basic(Lss, None, Ordered));
    m.insert("lte", basic(Gtr, None, Ordered));
    m.insert("min", basic(Lss, None, Ordered));
    m.insert("max", basic(Gtr, None, Ordered));
    m.insert("len", basic(Neq, None, Length));
    m.insert("rng", basic(Lss, None, Range));

    // string predicates with no extra arguments
    for (rule, func) in [
        ("email", "Email"),
        ("url", "URL"),
        ("uri", "URI"),
        ("ein", "EIN"),
        ("ssn", "SSN"),
        ("pan", "PAN"),
        ("cvv", "CVV"),
        ("ascii", "ASCII"),
        ("int", "Int"),
        ("uint", "Uint"),
        ("float", "Float"),
        ("numeric", "Numeric"),
        ("digits", "Digits"),
        ("hex", "Hex"),
        ("hexcolor", "HexColor"),
        ("base32", "Base32"),
        ("base58", "Base58"),
        ("binary", "Binary"),
        ("octal", "Octal"),
        ("bool", "Bool"),
        ("cidr", "CIDR"),
        ("fqdn", "FQDN"),
        ("bic", "BIC"),
        ("btc", "BTC"),
        ("eth", "ETH"),
        ("iban", "IBAN"),
        ("imei", "IMEI"),
        ("isin", "ISIN"),
        ("isrc", "ISRC"),
        ("issn", "ISSN"),
        ("ean", "EAN"),
        ("hsl", "HSL"),
        ("rgb", "RGB"),
        ("latlong", "LatLong"),
        ("locale", "Locale"),
        ("jwt", "JWT"),
        ("json", "JSON"),
        ("magneturi", "MagnetURI"),
        ("md5", "MD5"),
        ("mongoid", "MongoId"),
        ("passport", "PassportNumber"),
        ("datauri", "DataURI"),
        ("port", "Port"),
        ("semver", "SemVer"),
        ("slug", "Slug"),
        ("strongpass", "StrongPassword"),
        ("vat", "VAT"),
    ] {
        m.insert(rule, RuleSpec::Func(pred(func, &[S])));
    }

    // locale-qualified predicates: optional trailing country codes
    m.insert(
        "phone",
        RuleSpec::Func(pred("Phone", &[S, S]).variadic().check(check_country_code)),
    );
    m.insert(
        "zip",
        RuleSpec::Func(pred("Zip", &[S, S]).variadic().check(check_country_code)),
    );
    m.insert(
        "alpha",
        RuleSpec::Func(pred("Alpha", &[S, S]).variadic().check(check_country_code)),
    );
    m.insert(
        "alnum",
        RuleSpec::Func(pred("Alnum", &[S, S]).variadic().check(check_country_code)),
    );

    // versioned predicates
    m.insert(
        "uuid",
        RuleSpec::Func(pred("UUID", &[S, I]).variadic().check(check_uuid_ver)),
    );
    m.insert("ip", RuleSpec::Func(pred("IP", &[S, I]).check(check_ip_ver)));
    m.insert(
        "mac",
        RuleSpec::Func(pred("MAC", &[S, I]).check(check_mac_ver)),
    );
    m.insert(
        "isbn",
        RuleSpec::Func(pred("ISBN", &[S, I]).check(check_isbn_ver)),
    );
    m.insert(
        "iso",
        RuleSpec::Func(pred("ISO", &[S, I]).check(check_iso_std)),
    );
    m.insert(
        "rfc",
        RuleSpec::Func(pred("RFC", &[S, I]).check(check_rfc_std)),
    );

    m.insert("base64", RuleSpec::Func(pred("Base64", &[S, B])));
    m.insert("hash", RuleSpec::Func(pred("Hash", &[S, S])));

    // regex matching; patterns are compiled at analysis time and emitted
    // as raw literals with an init-block registration
    m.insert(
        "re",
        RuleSpec::Func(pred("Match", &[S, S]).raw().check(check_regexp)),
    );

    // substring rules chain over the host strings package
    m.insert(
        "contains",
        RuleSpec::Func(pred("Contains", &[S, S]).in_pkg(STRINGS_PKG).conn(BoolConn::Or)),
    );
    m.insert(
        "prefix",
        RuleSpec::Func(pred("HasPrefix", &[S, S]).in_pkg(STRINGS_PKG).conn(BoolConn::Or)),
    );
    m.insert(
        "suffix",
        RuleSpec::Func(pred("HasSuffix", &[S, S]).in_pkg(STRINGS_PKG).conn(BoolConn::Or)),
    );

    m
});

// ============================================================================
// ARGUMENT VALUE CHECKS
// ============================================================================

// Value checks apply to literal args only; field references are resolved
// and type-checked by the analyzer instead.
fn literal_args(rule: &Rule) -> impl Iterator<Item = &RuleArg> {
    rule.args.iter().filter(|a| a.typ != ArgType::FieldRef)
}

fn check_int_set(rule: &Rule, allowed: &[i64], err: fn(&Rule, &RuleArg) -> ErrorKind) -> Result<(), ErrorKind> {
    for arg in literal_args(rule) {
        let ok = arg.typ == ArgType::Int
            && arg
                .value
                .parse::<i64>()
                .is_ok_and(|n| allowed.contains(&n));
        if !ok {
            return Err(err(rule, arg));
        }
    }
    Ok(())
}

fn check_uuid_ver(rule: &Rule) -> Result<(), ErrorKind> {
    check_int_set(rule, &[0, 1, 2, 3, 4, 5], |r, a| ErrorKind::RuleArgValueUuidVer {
        rule: r.name.clone(),
        arg: a.clone(),
    })
}

fn check_ip_ver(rule: &Rule) -> Result<(), ErrorKind> {
    check_int_set(rule, &[0, 4, 6], |r, a| ErrorKind::RuleArgValueIpVer {
        rule: r.name.clone(),
        arg: a.clone(),
    })
}

fn check_mac_ver(rule: &Rule) -> Result<(), ErrorKind> {
    check_int_set(rule, &[0, 6, 8], |r, a| ErrorKind::RuleArgValueMacVer {
        rule: r.name.clone(),
        arg: a.clone(),
    })
}

fn check_isbn_ver(rule: &Rule) -> Result<(), ErrorKind> {
    check_int_set(rule, &[0, 10, 13], |r, a| ErrorKind::RuleArgValueIsbnVer {
        rule: r.name.clone(),
        arg: a.clone(),
    })
}

fn check_iso_std(rule: &Rule) -> Result<(), ErrorKind> {
    for arg in literal_args(rule) {
        if !arg.is_uint() {
            return Err(ErrorKind::RuleArgValueIsoStd {
                rule: rule.name.clone(),
                arg: arg.clone(),
            });
        }
    }
    Ok(())
}

fn check_rfc_std(rule: &Rule) -> Result<(), ErrorKind> {
    for arg in literal_args(rule) {
        if !arg.is_uint() {
            return Err(ErrorKind::RuleArgValueRfcStd {
                rule: rule.name.clone(),
                arg: arg.clone(),
            });
        }
    }
    Ok(())
}

static RX_COUNTRY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^[a-z]{2}$").unwrap());

fn check_country_code(rule: &Rule) -> Result<(), ErrorKind> {
    for arg in literal_args(rule) {
        if !RX_COUNTRY.is_match(&arg.value) {
            return Err(ErrorKind::RuleArgValueCountryCode {
                rule: rule.name.clone(),
                arg: arg.clone(),
            });
        }
    }
    Ok(())
}

// Patterns must compile here or the generated init block would abort the
// host program at startup.
fn check_regexp(rule: &Rule) -> Result<(), ErrorKind> {
    for arg in literal_args(rule) {
        if Regex::new(&arg.value).is_err() {
            return Err(ErrorKind::RuleArgValueRegexp {
                rule: rule.name.clone(),
                arg: arg.clone(),
            });
        }
    }
    Ok(())
}
