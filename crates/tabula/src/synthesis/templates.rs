//! Built-in Lua templates for common algorithmic conversions.
//!
//! Every template returns nil for input it cannot parse, so an unexpected
//! cell becomes empty instead of failing the whole apply.

use tracing::debug;

use crate::table::CellValue;
use crate::transform::{CellTransform, Example, LuaTransform, SandboxLimits, TransformOutput};

/// A named conversion with its Lua source.
#[derive(Debug, Clone, Copy)]
pub struct Template {
    pub name: &'static str,
    pub description: &'static str,
    /// Sample input and the output the template produces for it.
    pub example: (&'static str, &'static str),
    pub code: &'static str,
}

impl Template {
    /// Whether running the template on every example input yields exactly
    /// the example output.
    pub fn reproduces(&self, examples: &[Example], limits: SandboxLimits) -> bool {
        if examples.is_empty() {
            return false;
        }
        let Ok(transform) = LuaTransform::compile(self.code, limits) else {
            return false;
        };
        examples.iter().all(|example| {
            match transform.apply(&CellValue::Text(example.input.clone())) {
                Ok(TransformOutput::Value(value)) => value.to_string() == example.output.trim(),
                _ => false,
            }
        })
    }
}

/// All templates, in the order they are tried.
pub static TEMPLATES: &[Template] = &[
    Template {
        name: "date_format_change",
        description: "Reformat a YYYY-MM-DD or DD/MM/YYYY date as DD-MM-YYYY",
        example: ("2023-01-05", "05-01-2023"),
        code: r#"function transform(x)
  if x == nil then return nil end
  local s = tostring(x):match("^%s*(.-)%s*$")
  local y, m, d = s:match("^(%d%d%d%d)[-/](%d%d?)[-/](%d%d?)$")
  if y == nil then
    d, m, y = s:match("^(%d%d?)[-/](%d%d?)[-/](%d%d%d%d)$")
  end
  if y == nil then return nil end
  return string.format("%02d-%02d-%04d", tonumber(d), tonumber(m), tonumber(y))
end
"#,
    },
    Template {
        name: "extract_year_from_date",
        description: "Keep only the year of a date",
        example: ("2023-12-25", "2023"),
        code: r#"function transform(x)
  if x == nil then return nil end
  local s = tostring(x):match("^%s*(.-)%s*$")
  return s:match("^(%d%d%d%d)[-/]%d%d?[-/]%d%d?$") or s:match("^%d%d?[-/]%d%d?[-/](%d%d%d%d)$")
end
"#,
    },
    Template {
        name: "date_to_weekday",
        description: "Day of the week of a YYYY-MM-DD date",
        example: ("2023-04-12", "Wednesday"),
        code: r#"local NAMES = { "Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday" }
local OFFSETS = { 0, 3, 2, 5, 0, 3, 5, 1, 4, 6, 2, 4 }

function transform(x)
  if x == nil then return nil end
  local y, m, d = tostring(x):match("^%s*(%d%d%d%d)-(%d%d?)-(%d%d?)%s*$")
  if y == nil then return nil end
  y, m, d = tonumber(y), tonumber(m), tonumber(d)
  if m < 1 or m > 12 then return nil end
  if m < 3 then y = y - 1 end
  local w = (y + y // 4 - y // 100 + y // 400 + OFFSETS[m] + d) % 7
  return NAMES[w + 1]
end
"#,
    },
    Template {
        name: "gregorian_to_jalali",
        description: "Convert a Gregorian YYYY-MM-DD date to the Jalali calendar",
        example: ("2023-03-21", "1402/01/01"),
        code: r#"local DAYS = { 0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334 }

function transform(x)
  if x == nil then return nil end
  local gy, gm, gd = tostring(x):match("^%s*(%d%d%d%d)-(%d%d?)-(%d%d?)%s*$")
  if gy == nil then return nil end
  gy, gm, gd = tonumber(gy), tonumber(gm), tonumber(gd)
  if gm < 1 or gm > 12 then return nil end
  local gy2 = gy
  if gm > 2 then gy2 = gy + 1 end
  local days = 355666 + 365 * gy + (gy2 + 3) // 4 - (gy2 + 99) // 100 + (gy2 + 399) // 400 + gd + DAYS[gm]
  local jy = -1595 + 33 * (days // 12053)
  days = days % 12053
  jy = jy + 4 * (days // 1461)
  days = days % 1461
  if days > 365 then
    jy = jy + (days - 1) // 365
    days = (days - 1) % 365
  end
  local jm, jd
  if days < 186 then
    jm = 1 + days // 31
    jd = 1 + days % 31
  else
    days = days - 186
    jm = 7 + days // 30
    jd = 1 + days % 30
  end
  return string.format("%d/%02d/%02d", jy, jm, jd)
end
"#,
    },
    Template {
        name: "decimal_to_binary",
        description: "Write a non-negative integer in base 2",
        example: ("10", "1010"),
        code: r#"function transform(x)
  if x == nil then return nil end
  local n = tonumber(tostring(x):match("^%s*(.-)%s*$"), 10)
  if n == nil or n < 0 then return nil end
  if n == 0 then return "0" end
  local bits = {}
  while n > 0 do
    table.insert(bits, 1, tostring(n % 2))
    n = n // 2
  end
  return table.concat(bits)
end
"#,
    },
    Template {
        name: "binary_to_decimal",
        description: "Read a base 2 number",
        example: ("1010", "10"),
        code: r#"function transform(x)
  if x == nil then return nil end
  local n = tonumber(tostring(x):match("^%s*(.-)%s*$"), 2)
  if n == nil then return nil end
  return tostring(n)
end
"#,
    },
    Template {
        name: "hex_to_decimal",
        description: "Read a base 16 number",
        example: ("1F", "31"),
        code: r#"function transform(x)
  if x == nil then return nil end
  local s = tostring(x):match("^%s*(.-)%s*$")
  s = (s:gsub("^0[xX]", ""))
  local n = tonumber(s, 16)
  if n == nil then return nil end
  return tostring(n)
end
"#,
    },
    Template {
        name: "decimal_to_roman",
        description: "Write an integer from 1 to 3999 as a Roman numeral",
        example: ("1994", "MCMXCIV"),
        code: r#"local VALUES = { 1000, 900, 500, 400, 100, 90, 50, 40, 10, 9, 5, 4, 1 }
local SYMBOLS = { "M", "CM", "D", "CD", "C", "XC", "L", "XL", "X", "IX", "V", "IV", "I" }

function transform(x)
  if x == nil then return nil end
  local n = tonumber(tostring(x):match("^%s*(.-)%s*$"), 10)
  if n == nil or n < 1 or n > 3999 then return nil end
  local out = {}
  for i, v in ipairs(VALUES) do
    while n >= v do
      out[#out + 1] = SYMBOLS[i]
      n = n - v
    end
  end
  return table.concat(out)
end
"#,
    },
    Template {
        name: "roman_to_decimal",
        description: "Read a Roman numeral",
        example: ("IX", "9"),
        code: r#"local VALUES = { I = 1, V = 5, X = 10, L = 50, C = 100, D = 500, M = 1000 }

function transform(x)
  if x == nil then return nil end
  local s = tostring(x):match("^%s*(.-)%s*$"):upper()
  if s == "" then return nil end
  local total, prev = 0, 0
  for i = #s, 1, -1 do
    local v = VALUES[s:sub(i, i)]
    if v == nil then return nil end
    if v < prev then
      total = total - v
    else
      total = total + v
      prev = v
    end
  end
  return tostring(total)
end
"#,
    },
    Template {
        name: "char_to_ascii",
        description: "Code point of a single character",
        example: ("A", "65"),
        code: r#"function transform(x)
  if x == nil then return nil end
  local s = tostring(x)
  if utf8.len(s) ~= 1 then return nil end
  return tostring(utf8.codepoint(s))
end
"#,
    },
    Template {
        name: "ascii_to_char",
        description: "Character for a code point",
        example: ("66", "B"),
        code: r#"function transform(x)
  if x == nil then return nil end
  local n = tonumber(tostring(x):match("^%s*(.-)%s*$"), 10)
  if n == nil or n < 0 or n > 0x10FFFF then return nil end
  return utf8.char(n)
end
"#,
    },
    Template {
        name: "base64_encode",
        description: "Base64-encode text",
        example: ("hello", "aGVsbG8="),
        code: r#"local ALPHABET = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/"

function transform(x)
  if x == nil then return nil end
  local s = tostring(x)
  local out = {}
  for i = 1, #s, 3 do
    local a, b, c = s:byte(i, i + 2)
    local n = (a << 16) | ((b or 0) << 8) | (c or 0)
    local chunk = {}
    for k = 3, 0, -1 do
      local idx = (n >> (6 * k)) & 63
      chunk[#chunk + 1] = ALPHABET:sub(idx + 1, idx + 1)
    end
    if c == nil then chunk[4] = "=" end
    if b == nil then chunk[3] = "=" end
    out[#out + 1] = table.concat(chunk)
  end
  return table.concat(out)
end
"#,
    },
    Template {
        name: "base64_decode",
        description: "Decode Base64 text",
        example: ("aGVsbG8=", "hello"),
        code: r#"local ALPHABET = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/"

function transform(x)
  if x == nil then return nil end
  local s = (tostring(x):gsub("%s", ""))
  if #s == 0 or #s % 4 ~= 0 or s:find("[^%w%+/=]") then return nil end
  local out = {}
  for i = 1, #s, 4 do
    local n, pad = 0, 0
    for j = i, i + 3 do
      local ch = s:sub(j, j)
      local v = 0
      if ch == "=" then
        pad = pad + 1
      else
        v = ALPHABET:find(ch, 1, true) - 1
      end
      n = (n << 6) | v
    end
    local bytes = string.char((n >> 16) & 255, (n >> 8) & 255, n & 255)
    out[#out + 1] = bytes:sub(1, 3 - pad)
  end
  return table.concat(out)
end
"#,
    },
    Template {
        name: "unicode_to_char",
        description: "Character for a U+XXXX code point",
        example: ("U+0627", "\u{0627}"),
        code: r#"function transform(x)
  if x == nil then return nil end
  local hex = tostring(x):match("^%s*[Uu]%+(%x+)%s*$")
  if hex == nil then return nil end
  local n = tonumber(hex, 16)
  if n == nil or n > 0x10FFFF then return nil end
  return utf8.char(n)
end
"#,
    },
    Template {
        name: "convert_12h_to_24h",
        description: "Convert HH:MM AM/PM to 24-hour HH:MM",
        example: ("03:45 PM", "15:45"),
        code: r#"function transform(x)
  if x == nil then return nil end
  local h, m, ampm = tostring(x):match("^%s*(%d%d?):(%d%d)%s*([AaPp][Mm])%s*$")
  if h == nil then return nil end
  h = tonumber(h)
  if h < 1 or h > 12 then return nil end
  ampm = ampm:upper()
  if ampm == "AM" and h == 12 then
    h = 0
  elseif ampm == "PM" and h ~= 12 then
    h = h + 12
  end
  return string.format("%02d:%s", h, m)
end
"#,
    },
    Template {
        name: "minutes_to_hhmm",
        description: "Format a number of minutes as HH:MM",
        example: ("135", "02:15"),
        code: r#"function transform(x)
  if x == nil then return nil end
  local n = tonumber(tostring(x):match("^%s*(.-)%s*$"), 10)
  if n == nil or n < 0 then return nil end
  return string.format("%02d:%02d", n // 60, n % 60)
end
"#,
    },
    Template {
        name: "time_to_seconds",
        description: "Total seconds of an HH:MM:SS time",
        example: ("01:30:00", "5400"),
        code: r#"function transform(x)
  if x == nil then return nil end
  local h, m, s = tostring(x):match("^%s*(%d+):(%d%d):(%d%d)%s*$")
  if h == nil then return nil end
  return tostring(tonumber(h) * 3600 + tonumber(m) * 60 + tonumber(s))
end
"#,
    },
    Template {
        name: "extract_domain_from_email",
        description: "Domain part of an email address",
        example: ("test@example.com", "example.com"),
        code: r#"function transform(x)
  if x == nil then return nil end
  return tostring(x):match("^%s*[^@%s]+@([^@%s]+%.[^@%s]+)%s*$")
end
"#,
    },
    Template {
        name: "extract_path_from_url",
        description: "Path component of a URL",
        example: ("https://site.com/path/info", "/path/info"),
        code: r#"function transform(x)
  if x == nil then return nil end
  local rest = tostring(x):match("^%s*%a[%w%+%.%-]*://[^/?#%s]*(%S*)%s*$")
  if rest == nil then return nil end
  return rest:match("^([^?#]*)")
end
"#,
    },
    Template {
        name: "validate_ip_format",
        description: "Whether the value is a dotted IPv4 address",
        example: ("192.168.1.1", "valid"),
        code: r#"function transform(x)
  if x == nil then return "invalid" end
  local parts = { tostring(x):match("^%s*(%d+)%.(%d+)%.(%d+)%.(%d+)%s*$") }
  if #parts ~= 4 then return "invalid" end
  for _, p in ipairs(parts) do
    if #p > 3 or tonumber(p) > 255 then return "invalid" end
  end
  return "valid"
end
"#,
    },
];

/// Look a template up by name.
pub fn get(name: &str) -> Option<&'static Template> {
    TEMPLATES.iter().find(|t| t.name == name)
}

/// Template names, in order.
pub fn names() -> Vec<&'static str> {
    TEMPLATES.iter().map(|t| t.name).collect()
}

/// First template that reproduces every example.
pub fn find_matching(examples: &[Example], limits: SandboxLimits) -> Option<&'static Template> {
    let found = TEMPLATES.iter().find(|t| t.reproduces(examples, limits));
    if let Some(template) = found {
        debug!(template = template.name, "Template reproduces the examples");
    }
    found
}
