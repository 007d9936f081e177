//! Escaping for free-text fields carried inside frames.
//!
//! Structural tokens (command names, tags, numeric ids) are never escaped;
//! only user-supplied text goes through [`encode`] before it is placed
//! between `|` or `:` separators. Commas are escaped too, since roster
//! pushes use them to separate entries.

const ENTITIES: &[(char, &str)] = &[
    ('&', "&#38;"),
    ('|', "&#124;"),
    (':', "&#58;"),
    (',', "&#44;"),
    ('\n', "&#10;"),
    ('\r', "&#13;"),
];

/// Escape the reserved characters of `text` for use as a frame field.
pub fn encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match ENTITIES.iter().find(|(reserved, _)| *reserved == c) {
            Some((_, entity)) => out.push_str(entity),
            None => out.push(c),
        }
    }
    out
}

/// Reverse [`encode`]. Unknown `&...;` sequences are kept verbatim.
pub fn decode(wire: &str) -> String {
    let mut out = String::with_capacity(wire.len());
    let mut rest = wire;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match ENTITIES
            .iter()
            .find(|(_, entity)| rest.starts_with(entity))
        {
            Some((reserved, entity)) => {
                out.push(*reserved);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
