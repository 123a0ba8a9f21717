use crate::attributes::{opening_tag, Attributes};
use crate::entities::Entities;
use crate::error::{Error, Result};
use crate::escape::escape;
use crate::rules::{Action, CloseRules, NodeKind, OpenRules, TransformFn, TransformMode};
use log::{debug, trace};
use quick_xml::escape::unescape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Error as XMLError, Reader};
use std::borrow::Cow;

const MAX_ENTITY_DEPTH: usize = 16;
const MAX_ENTITY_EXPANSIONS: usize = 100_000;

/// Options of one transformation.
///
/// `keep_cdata`: if false, CDATA sections are written as escaped text.
/// `keep_comments`, `keep_processing_instructions`: if false, comments and
/// processing instructions inside the root element are dropped.
/// Anything outside the root element is never written.
///
/// Comments and processing instructions are kept by default, so that an
/// unchanged document keeps them. Transformers built on a pull reader that
/// only reports elements and text drop them; set both flags to `false` for
/// that behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOptions {
    pub keep_cdata: bool,
    pub keep_comments: bool,
    pub keep_processing_instructions: bool,
}

impl Default for TransformOptions {
    fn default() -> TransformOptions {
        TransformOptions {
            keep_cdata: true,
            keep_comments: true,
            keep_processing_instructions: true,
        }
    }
}

/// Output of an element whose rules asked for a transform, collected
/// until its closing tag.
struct PendingTransform {
    function: TransformFn,
    mode: TransformMode,
    buffer: String,
    // Length of the opening tag at the start of `buffer`.
    opening_len: usize,
}

impl PendingTransform {
    fn resolve(self, rules: &CloseRules, closing_tag: &str) -> Result<String> {
        let function = self.function;
        match self.mode {
            TransformMode::Outer => {
                let mut outer = self.buffer;
                outer.push_str(&rules.insert_at_end);
                outer.push_str(closing_tag);
                outer.push_str(&rules.insert_after);
                function(outer).map_err(Error::Transform)
            }
            TransformMode::Inner => {
                let mut fragment = self.buffer;
                let mut inner = fragment.split_off(self.opening_len);
                inner.push_str(&rules.insert_at_end);
                fragment.push_str(&function(inner).map_err(Error::Transform)?);
                fragment.push_str(closing_tag);
                fragment.push_str(&rules.insert_after);
                Ok(fragment)
            }
        }
    }
}

/// One open element of the output.
struct Frame {
    attributes: Attributes,
    pending: Option<PendingTransform>,
}

pub(crate) struct Transformer<F> {
    callback: F,
    opts: TransformOptions,
    stack: Vec<Frame>,
    // Depth inside a suppressed element, 0 if not inside one.
    ignore_depth: usize,
    // Depth of the source document.
    depth: usize,
    root_done: bool,
    entities: Entities,
    // Entity replacement texts being parsed, and how many were parsed so far.
    entity_depth: usize,
    expansions: usize,
    output: String,
}

impl<F> Transformer<F>
where
    F: FnMut(&str, &Attributes, NodeKind) -> Action,
{
    pub(crate) fn new(callback: F, opts: TransformOptions) -> Transformer<F> {
        Transformer {
            callback,
            opts,
            stack: Vec::new(),
            ignore_depth: 0,
            depth: 0,
            root_done: false,
            entities: Entities::new(),
            entity_depth: 0,
            expansions: 0,
            output: String::new(),
        }
    }

    pub(crate) fn run(mut self, xml: &str) -> Result<String> {
        let mut reader = event_reader(xml);
        self.output.reserve(xml.len());

        let mut buf = Vec::with_capacity(200);
        loop {
            let ev = reader.read_event(&mut buf)?;
            trace!("{:?}", ev);
            if self.handle_event(ev)? {
                return Ok(self.output);
            }
            buf.clear();
        }
    }

    // Returns if the document is finished.
    fn handle_event(&mut self, event: Event) -> Result<bool> {
        match event {
            Event::Start(ref ev) => {
                self.check_single_root()?;
                self.depth += 1;
                self.element_open(ev, false)?;
                Ok(false)
            }
            Event::Empty(ref ev) => {
                self.check_single_root()?;
                self.element_open(ev, true)?;
                if self.depth == 0 {
                    self.root_done = true;
                }
                Ok(false)
            }
            Event::End(ref ev) => {
                let name = String::from_utf8(ev.name().to_vec())?;
                if self.depth == 0 {
                    return Err(Error::MalformedXML(format!(
                        "Closing tag </{}> without opening tag",
                        name
                    )));
                }
                self.depth -= 1;
                self.element_close(&name)?;
                if self.depth == 0 {
                    self.root_done = true;
                }
                Ok(false)
            }
            Event::Text(ev) => {
                self.text(ev.escaped())?;
                Ok(false)
            }
            Event::CData(ev) => {
                self.cdata(&ev)?;
                Ok(false)
            }
            Event::Comment(ev) => {
                if self.opts.keep_comments {
                    self.markup("<!--", &ev, "-->")?;
                }
                Ok(false)
            }
            Event::PI(ev) => {
                if self.opts.keep_processing_instructions {
                    self.markup("<?", &ev, "?>")?;
                }
                Ok(false)
            }
            Event::DocType(ev) => {
                self.entities.collect(ev.escaped());
                Ok(false)
            }
            Event::Decl(_) => Ok(false),
            Event::Eof => {
                self.finish()?;
                Ok(true)
            }
        }
    }

    fn check_single_root(&self) -> Result<()> {
        if self.depth == 0 && self.root_done {
            return Err(Error::MalformedXML(
                "Extra content at the end of the document".to_string(),
            ));
        }
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        if self.depth > 0 || !self.stack.is_empty() {
            return Err(Error::MalformedXML(
                "Premature end of data, element not closed".to_string(),
            ));
        }
        if !self.root_done {
            return Err(Error::MalformedXML(
                "Looks like the input XML is empty or invalid".to_string(),
            ));
        }
        Ok(())
    }

    fn element_open(&mut self, ev: &BytesStart, empty: bool) -> Result<()> {
        if self.ignore_depth > 0 {
            if !empty {
                self.ignore_depth += 1;
            }
            return Ok(());
        }

        let name = String::from_utf8(ev.name().to_vec())?;
        let attributes = self.read_attributes(ev)?;
        let kind = if empty { NodeKind::Empty } else { NodeKind::Open };

        let rules = match (self.callback)(&name, &attributes, kind) {
            Action::Suppress => {
                if !empty {
                    debug!("suppressing <{}> and its content", name);
                    self.ignore_depth = 1;
                }
                return Ok(());
            }
            Action::Unchanged => OpenRules::unchanged(&name),
            Action::Rules(rules) => rules.into_open_rules(&name, empty)?,
        };

        let tag = match &rules.tag {
            Some(tag) => opening_tag(tag, &attributes, &rules.attributes, empty),
            None => String::new(),
        };

        self.emit(&rules.insert_before);
        if empty {
            self.emit(&tag);
            self.emit(&rules.insert_after);
            return Ok(());
        }

        let pending = rules.transform.map(|(mode, function)| PendingTransform {
            function,
            mode,
            buffer: String::new(),
            opening_len: tag.len(),
        });
        self.stack.push(Frame {
            attributes,
            pending,
        });
        // From here on, output goes to the new frame if it has a transform.
        self.emit(&tag);
        self.emit(&rules.insert_at_start);
        Ok(())
    }

    fn element_close(&mut self, name: &str) -> Result<()> {
        if self.ignore_depth > 0 {
            // The suppressed element's own closing tag ends here as well.
            self.ignore_depth -= 1;
            return Ok(());
        }

        let frame = self.stack.pop().ok_or_else(|| {
            Error::MalformedXML(format!("Closing tag </{}> without opening tag", name))
        })?;

        let rules = match (self.callback)(name, &frame.attributes, NodeKind::Close) {
            Action::Suppress => {
                if let Some(pending) = frame.pending {
                    self.emit(&pending.buffer);
                }
                return Ok(());
            }
            Action::Unchanged => CloseRules::unchanged(name),
            Action::Rules(rules) => rules.into_close_rules(name)?,
        };

        let closing_tag = match &rules.tag {
            Some(tag) => format!("</{}>", tag),
            None => String::new(),
        };

        let fragment = match frame.pending {
            Some(pending) => {
                debug!("applying transform of <{}>", name);
                pending.resolve(&rules, &closing_tag)?
            }
            None => {
                let mut fragment = rules.insert_at_end;
                fragment.push_str(&closing_tag);
                fragment.push_str(&rules.insert_after);
                fragment
            }
        };
        self.emit(&fragment);
        Ok(())
    }

    fn read_attributes(&self, ev: &BytesStart) -> Result<Attributes> {
        let mut attributes = Attributes::new();
        for attr in ev.attributes() {
            let attr = attr?;
            let key = String::from_utf8(attr.key.to_vec())?;
            let normalized = Attribute {
                key: attr.key,
                value: normalize_attr_value(attr.value),
            };
            let value = normalized.unescaped_value_with_custom_entities(self.entities.values())?;
            attributes.insert(key, String::from_utf8(value.to_vec())?);
        }
        Ok(attributes)
    }

    fn text(&mut self, raw: &[u8]) -> Result<()> {
        if self.depth == 0 {
            if raw.iter().all(|b| b.is_ascii_whitespace()) {
                return Ok(());
            }
            return Err(Error::MalformedXML(
                "Text outside of the root element".to_string(),
            ));
        }
        if self.ignore_depth > 0 {
            return Ok(());
        }
        let mut rest = raw;
        loop {
            let (start, end, replacement) = match self.entities.find_reference(rest) {
                Some((start, end, replacement)) => {
                    (start, end, String::from_utf8(replacement.to_vec())?)
                }
                None => break,
            };
            self.plain_text(&rest[..start])?;
            self.expand_entity(&rest[start + 1..end - 1], &replacement)?;
            rest = &rest[end..];
        }
        self.plain_text(rest)
    }

    fn plain_text(&mut self, raw: &[u8]) -> Result<()> {
        if raw.is_empty() {
            return Ok(());
        }
        let text = unescape(raw).map_err(XMLError::EscapeError)?;
        let text = std::str::from_utf8(&text)?;
        self.emit(&escape(text));
        Ok(())
    }

    // The replacement text of an entity is parsed as content in place of the reference.
    fn expand_entity(&mut self, name: &[u8], replacement: &str) -> Result<()> {
        let name = String::from_utf8(name.to_vec())?;
        self.expansions += 1;
        if self.entity_depth >= MAX_ENTITY_DEPTH || self.expansions > MAX_ENTITY_EXPANSIONS {
            return Err(Error::MalformedXML(format!(
                "Too many entity references while expanding &{};",
                name
            )));
        }
        debug!("expanding entity &{};", name);
        let not_well_formed = || {
            Error::MalformedXML(format!("Replacement text of &{}; is not well-formed", name))
        };

        let depth = self.depth;
        self.entity_depth += 1;
        let mut reader = event_reader(replacement);
        let mut buf = Vec::new();
        loop {
            let ev = reader.read_event(&mut buf)?;
            trace!("{:?}", ev);
            match ev {
                Event::Eof => break,
                Event::End(_) if self.depth <= depth => return Err(not_well_formed()),
                Event::Decl(_) | Event::DocType(_) => return Err(not_well_formed()),
                ev => {
                    self.handle_event(ev)?;
                }
            }
            buf.clear();
        }
        self.entity_depth -= 1;
        if self.depth != depth {
            return Err(not_well_formed());
        }
        Ok(())
    }

    fn cdata(&mut self, ev: &BytesText) -> Result<()> {
        if self.depth == 0 {
            return Err(Error::MalformedXML(
                "CDATA outside of the root element".to_string(),
            ));
        }
        if self.ignore_depth > 0 {
            return Ok(());
        }
        // quick-xml hands CDATA content over escaped.
        let content = String::from_utf8(ev.unescaped()?.to_vec())?;
        if self.opts.keep_cdata {
            self.emit("<![CDATA[");
            self.emit(&content);
            self.emit("]]>");
        } else {
            self.emit(&escape(&content));
        }
        Ok(())
    }

    // Comments and processing instructions, copied verbatim.
    fn markup(&mut self, open: &str, ev: &BytesText, close: &str) -> Result<()> {
        if self.depth == 0 || self.ignore_depth > 0 {
            return Ok(());
        }
        let content = String::from_utf8(ev.to_vec())?;
        self.emit(open);
        self.emit(&content);
        self.emit(close);
        Ok(())
    }

    /// Appends to the innermost pending transform, or to the output if there is none.
    fn emit(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        let sink = match self
            .stack
            .iter_mut()
            .rev()
            .find_map(|frame| frame.pending.as_mut())
        {
            Some(pending) => &mut pending.buffer,
            None => &mut self.output,
        };
        sink.push_str(fragment);
    }
}

fn event_reader(xml: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(xml);
    reader
        .trim_text(false)
        .expand_empty_elements(false)
        .check_end_names(true);
    reader
}

// Attribute-value normalization: literal tabs and line breaks become spaces,
// "\r\n" counts as one. Character references are untouched since this runs
// before unescaping.
fn normalize_attr_value(raw: Cow<[u8]>) -> Cow<[u8]> {
    if !raw.iter().any(|b| matches!(b, b'\t' | b'\n' | b'\r')) {
        return raw;
    }
    let mut normalized = Vec::with_capacity(raw.len());
    let mut iter = raw.iter().peekable();
    while let Some(&b) = iter.next() {
        match b {
            b'\r' => {
                if iter.peek() == Some(&&b'\n') {
                    iter.next();
                }
                normalized.push(b' ');
            }
            b'\t' | b'\n' => normalized.push(b' '),
            b => normalized.push(b),
        }
    }
    Cow::Owned(normalized)
}
