//! The HVML tokenizer
//!
//! A character-at-a-time state machine over a rewindable stream. Markup
//! states follow the HTML tokenization algorithm; `{`, `[`, and `$` switch
//! into the embedded-expression (eJSON) sub-machine, which builds VCM
//! subtrees carried by text tokens and attribute values.
//!
//! Errors never abort the stream: the defect is recorded in the last-error
//! slot, a breadcrumb is logged, and the machine continues from a defined
//! recovery state (usually `Data`). The parser above decides whether to
//! give up.

use crate::charref;
use crate::reader::CharReader;
use crate::tags;
use crate::token::{AttrValue, Attribute, Token};
use hvml_core::CharBuffer;
use hvml_core::errors::{self, ErrorCode};
use hvml_variant::{Variant, VcmNode};

/// Default cap on embedded-expression nesting; the environment variable
/// `HVML_MAX_EMBEDDED_DEPTH` overrides it.
const DEFAULT_MAX_EMBEDDED_DEPTH: usize = 32;

fn max_embedded_depth_from_env(env_value: Option<String>) -> usize {
    match env_value {
        Some(val) => match val.parse::<usize>() {
            Ok(0) | Err(_) => {
                tracing::warn!(value = %val, "invalid HVML_MAX_EMBEDDED_DEPTH, using default");
                DEFAULT_MAX_EMBEDDED_DEPTH
            }
            Ok(n) => n,
        },
        None => DEFAULT_MAX_EMBEDDED_DEPTH,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Data,
    TagOpen,
    EndTagOpen,
    TagName,
    BeforeAttributeName,
    AttributeName,
    AfterAttributeName,
    BeforeAttributeValue,
    AttributeValueDq,
    AttributeValueSq,
    AttributeValueUnq,
    AfterAttributeValueQuoted,
    SelfClosingStartTag,
    BogusComment,
    MarkupDeclarationOpen,
    CommentStart,
    CommentStartDash,
    Comment,
    CommentLessThan,
    CommentLessThanBang,
    CommentLessThanBangDash,
    CommentLessThanBangDashDash,
    CommentEndDash,
    CommentEnd,
    CommentEndBang,
    Doctype,
    BeforeDoctypeName,
    DoctypeName,
    AfterDoctypeName,
    AfterDoctypePublicKeyword,
    BeforeDoctypePublicId,
    DoctypePublicIdDq,
    DoctypePublicIdSq,
    AfterDoctypePublicId,
    BetweenDoctypePublicAndSystem,
    AfterDoctypeSystemKeyword,
    BeforeDoctypeSystemId,
    DoctypeSystemIdDq,
    DoctypeSystemIdSq,
    AfterDoctypeSystemId,
    BogusDoctype,
    EjsonValue,
    EjsonAfterValue,
    EjsonObjectKey,
    EjsonAfterKey,
    EjsonString,
    EjsonStringEscape,
    EjsonNumber,
    EjsonKeyword,
    EjsonVariable,
    EjsonMemberName,
}

/// Where a decoded character or finished expression lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Carrier {
    Text,
    Attr,
}

/// Where a finished `$variable` chain attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarReturn {
    /// Directly as an expression piece (text, attr, or ejson value).
    Expression,
    /// Into the pieces of the string being scanned.
    InString,
}

/// An open expression node under construction.
enum VcmFrame {
    Object {
        pairs: Vec<(VcmNode, VcmNode)>,
        key: Option<VcmNode>,
    },
    Array {
        items: Vec<VcmNode>,
    },
    CallArgs {
        callee: VcmNode,
        args: Vec<VcmNode>,
    },
}

pub struct Tokenizer {
    state: State,
    reader: CharReader,

    temp_buffer: CharBuffer,
    tag_name: CharBuffer,
    string_buffer: CharBuffer,

    // Text accumulation for the Data state.
    text_literal: CharBuffer,
    text_pieces: Vec<VcmNode>,

    // The tag under construction.
    tag_is_end: bool,
    tag_attrs: Vec<Attribute>,
    tag_self_closing: bool,
    tag_is_operation: bool,
    tag_has_raw_attr: bool,

    // The attribute under construction.
    attr_name: CharBuffer,
    attr_literal: CharBuffer,
    attr_pieces: Vec<VcmNode>,
    attr_has_value: bool,

    comment: CharBuffer,

    doctype_name: CharBuffer,
    doctype_public: Option<String>,
    doctype_system: Option<String>,

    // Embedded-expression machine.
    vcm_stack: Vec<VcmFrame>,
    ejson_stack: Vec<char>,
    ejson_exit: State,
    ejson_carrier: Carrier,
    prev_separator: char,
    nr_quoted: usize,
    string_quote: char,
    string_pieces: Vec<VcmNode>,
    var_chain: Option<VcmNode>,
    var_return: VarReturn,

    char_ref_code: u32,
    max_depth: usize,
    eof_returned: bool,
}

impl Tokenizer {
    pub fn new(input: &str) -> Self {
        let max_depth =
            max_embedded_depth_from_env(std::env::var("HVML_MAX_EMBEDDED_DEPTH").ok());
        Tokenizer {
            state: State::Data,
            reader: CharReader::new(input),
            temp_buffer: CharBuffer::new(),
            tag_name: CharBuffer::new(),
            string_buffer: CharBuffer::new(),
            text_literal: CharBuffer::new(),
            text_pieces: Vec::new(),
            tag_is_end: false,
            tag_attrs: Vec::new(),
            tag_self_closing: false,
            tag_is_operation: false,
            tag_has_raw_attr: false,
            attr_name: CharBuffer::new(),
            attr_literal: CharBuffer::new(),
            attr_pieces: Vec::new(),
            attr_has_value: false,
            comment: CharBuffer::new(),
            doctype_name: CharBuffer::new(),
            doctype_public: None,
            doctype_system: None,
            vcm_stack: Vec::new(),
            ejson_stack: Vec::new(),
            ejson_exit: State::Data,
            ejson_carrier: Carrier::Text,
            prev_separator: '\0',
            nr_quoted: 0,
            string_quote: '"',
            string_pieces: Vec::new(),
            var_chain: None,
            var_return: VarReturn::Expression,
            char_ref_code: 0,
            max_depth,
            eof_returned: false,
        }
    }

    /// Re-initialize over new input. All buffers empty, both expression
    /// stacks drain (open nodes fold into their parents and drop), and the
    /// machine is back in the Data state.
    pub fn reset(&mut self, input: &str) {
        self.reader = CharReader::new(input);
        self.state = State::Data;
        self.temp_buffer.reset();
        self.tag_name.reset();
        self.string_buffer.reset();
        self.text_literal.reset();
        self.text_pieces.clear();
        self.tag_is_end = false;
        self.tag_attrs.clear();
        self.tag_self_closing = false;
        self.tag_is_operation = false;
        self.tag_has_raw_attr = false;
        self.attr_name.reset();
        self.attr_literal.reset();
        self.attr_pieces.clear();
        self.attr_has_value = false;
        self.comment.reset();
        self.doctype_name.reset();
        self.doctype_public = None;
        self.doctype_system = None;
        self.drain_vcm_stack();
        self.ejson_stack.clear();
        self.prev_separator = '\0';
        self.nr_quoted = 0;
        self.string_pieces.clear();
        self.var_chain = None;
        self.char_ref_code = 0;
        self.eof_returned = false;
    }

    /// Fold any open expression nodes into their parents, then drop the
    /// partial tree.
    fn drain_vcm_stack(&mut self) {
        while let Some(frame) = self.vcm_stack.pop() {
            let node = match frame {
                VcmFrame::Object { pairs, .. } => VcmNode::ObjectLit(pairs),
                VcmFrame::Array { items } => VcmNode::ArrayLit(items),
                VcmFrame::CallArgs { callee, args } => VcmNode::Call {
                    callee: Box::new(callee),
                    args,
                },
            };
            if let Some(parent) = self.vcm_stack.last_mut() {
                match parent {
                    VcmFrame::Object { key, pairs } => {
                        if let Some(k) = key.take() {
                            pairs.push((k, node));
                        }
                    }
                    VcmFrame::Array { items } => items.push(node),
                    VcmFrame::CallArgs { args, .. } => args.push(node),
                }
            }
        }
    }

    /// Run the machine until the next token is ready.
    pub fn next_token(&mut self) -> Token {
        loop {
            if self.eof_returned {
                return Token::Eof;
            }
            let ch = self.reader.next_char();
            if let Some(tok) = self.step(ch) {
                return tok;
            }
            if ch.is_none() && self.state == State::Data {
                // Nothing buffered and input is gone.
                self.eof_returned = true;
                return Token::Eof;
            }
        }
    }

    /// Tokenize a whole document, EOF token included.
    pub fn tokenize(input: &str) -> Vec<Token> {
        let mut tk = Tokenizer::new(input);
        let mut out = Vec::new();
        loop {
            let tok = tk.next_token();
            let done = tok.is_eof();
            out.push(tok);
            if done {
                return out;
            }
        }
    }

    fn report(&mut self, code: ErrorCode) {
        errors::set_last_error(code);
        tracing::debug!(code, position = self.reader.position(), "tokenizer defect");
    }

    // ---- carriers -------------------------------------------------------

    fn carrier_push_char(&mut self, ch: char) {
        match self.ejson_carrier {
            Carrier::Text => self.text_literal.append_char(ch),
            Carrier::Attr => self.attr_literal.append_char(ch),
        }
    }

    fn carrier_push_str(&mut self, s: &str) {
        match self.ejson_carrier {
            Carrier::Text => self.text_literal.append_str(s),
            Carrier::Attr => self.attr_literal.append_str(s),
        }
    }

    fn carrier_push_piece(&mut self, node: VcmNode) {
        match self.ejson_carrier {
            Carrier::Text => {
                if !self.text_literal.is_empty() {
                    let lit = self.text_literal.take_string();
                    self.text_pieces.push(VcmNode::Literal(Variant::string(lit)));
                }
                self.text_pieces.push(node);
            }
            Carrier::Attr => {
                if !self.attr_literal.is_empty() {
                    let lit = self.attr_literal.take_string();
                    self.attr_pieces.push(VcmNode::Literal(Variant::string(lit)));
                }
                self.attr_pieces.push(node);
            }
        }
    }

    fn flush_text(&mut self) -> Option<Token> {
        if !self.text_literal.is_empty() {
            let lit = self.text_literal.take_string();
            self.text_pieces.push(VcmNode::Literal(Variant::string(lit)));
        }
        match self.text_pieces.len() {
            0 => None,
            1 => Some(Token::Text(self.text_pieces.pop().expect("one piece"))),
            _ => Some(Token::Text(VcmNode::ConcatString(std::mem::take(
                &mut self.text_pieces,
            )))),
        }
    }

    // ---- tags -----------------------------------------------------------

    fn begin_tag(&mut self, is_end: bool) {
        self.tag_name.reset();
        self.tag_is_end = is_end;
        self.tag_attrs.clear();
        self.tag_self_closing = false;
        self.tag_is_operation = false;
        self.tag_has_raw_attr = false;
    }

    /// Tag-name re-classification happens as soon as the name is complete.
    fn classify_tag(&mut self) {
        let name = self.tag_name.as_str();
        self.tag_is_operation = tags::is_operation_tag(name);
        self.tag_has_raw_attr = tags::is_raw_attr_tag(name);
    }

    fn begin_attr(&mut self) {
        self.attr_name.reset();
        self.attr_literal.reset();
        self.attr_pieces.clear();
        self.attr_has_value = false;
    }

    fn finish_attr(&mut self) {
        if self.attr_name.is_empty() {
            return;
        }
        let name = self.attr_name.take_string();
        let value = if !self.attr_has_value {
            None
        } else if self.attr_pieces.is_empty() {
            Some(AttrValue::Literal(self.attr_literal.take_string()))
        } else {
            if !self.attr_literal.is_empty() {
                let lit = self.attr_literal.take_string();
                self.attr_pieces.push(VcmNode::Literal(Variant::string(lit)));
            }
            let mut pieces = std::mem::take(&mut self.attr_pieces);
            let node = if pieces.len() == 1 {
                pieces.pop().expect("one piece")
            } else {
                VcmNode::ConcatString(pieces)
            };
            Some(AttrValue::Vcm(node))
        };
        if self.tag_attrs.iter().any(|a| a.name == name) {
            // Duplicate attributes are dropped, first one wins.
            self.report(errors::DUPLICATED);
            return;
        }
        self.tag_attrs.push(Attribute { name, value });
    }

    fn emit_tag(&mut self) -> Token {
        self.finish_attr();
        self.state = State::Data;
        let name = self.tag_name.take_string();
        if self.tag_is_end {
            if !self.tag_attrs.is_empty() {
                self.report(errors::HVML_UNEXPECTED_CHARACTER);
                self.tag_attrs.clear();
            }
            Token::EndTag { name }
        } else {
            Token::StartTag {
                name,
                attributes: std::mem::take(&mut self.tag_attrs),
                self_closing: self.tag_self_closing,
                is_operation: self.tag_is_operation,
                has_raw_attr: self.tag_has_raw_attr,
            }
        }
    }

    fn emit_comment(&mut self) -> Token {
        self.state = State::Data;
        Token::Comment(self.comment.take_string())
    }

    fn emit_doctype(&mut self) -> Token {
        self.state = State::Data;
        Token::Doctype {
            name: self.doctype_name.take_string(),
            public_id: self.doctype_public.take(),
            system_id: self.doctype_system.take(),
        }
    }

    // ---- character references ------------------------------------------

    /// Decode the reference starting after `&`. The reader sits right after
    /// the ampersand; on return the decoded text is in the carrier.
    fn consume_char_ref(&mut self, carrier: Carrier) {
        self.ejson_carrier = carrier;
        match self.reader.next_char() {
            Some('#') => self.consume_numeric_char_ref(),
            Some(c) if c.is_ascii_alphanumeric() => {
                self.reader.rewind(1);
                self.consume_named_char_ref();
            }
            Some(c) => {
                self.carrier_push_char('&');
                self.reader.rewind(1);
                let _ = c;
            }
            None => self.carrier_push_char('&'),
        }
    }

    fn consume_named_char_ref(&mut self) {
        self.temp_buffer.reset();
        let mut consumed = 0usize;
        let mut best: Option<(usize, &'static str)> = None;
        loop {
            let Some(c) = self.reader.next_char() else {
                break;
            };
            consumed += 1;
            self.temp_buffer.append_char(c);
            let candidate = self.temp_buffer.as_str();
            if let Some(repl) = charref::named_replacement(candidate) {
                best = Some((consumed, repl));
            }
            if !charref::any_named_starts_with(candidate) {
                break;
            }
        }
        match best {
            Some((len, repl)) => {
                self.reader.rewind(consumed - len);
                let matched_ends_with_semicolon = {
                    let s = self.temp_buffer.as_str();
                    s.as_bytes().get(len - 1) == Some(&b';')
                };
                if !matched_ends_with_semicolon {
                    self.report(errors::HVML_MISSING_SEMICOLON_AFTER_CHARACTER_REFERENCE);
                }
                self.carrier_push_str(repl);
            }
            None => {
                // No match at all: the text stands as written.
                if self.temp_buffer.end_with(";") {
                    self.report(errors::HVML_UNKNOWN_NAMED_CHARACTER_REFERENCE);
                }
                self.reader.rewind(consumed);
                self.carrier_push_char('&');
            }
        }
        self.temp_buffer.reset();
    }

    fn consume_numeric_char_ref(&mut self) {
        self.char_ref_code = 0;
        let hex = match self.reader.peek() {
            Some('x') | Some('X') => {
                self.reader.next_char();
                true
            }
            _ => false,
        };
        let mut nr_digits = 0usize;
        loop {
            let Some(c) = self.reader.next_char() else {
                break;
            };
            let digit = if hex {
                c.to_digit(16)
            } else {
                c.to_digit(10)
            };
            match digit {
                Some(d) => {
                    nr_digits += 1;
                    self.char_ref_code = self
                        .char_ref_code
                        .saturating_mul(if hex { 16 } else { 10 })
                        .saturating_add(d);
                }
                None => {
                    if c != ';' {
                        self.reader.rewind(1);
                        if nr_digits > 0 {
                            self.report(
                                errors::HVML_MISSING_SEMICOLON_AFTER_CHARACTER_REFERENCE,
                            );
                        }
                    }
                    break;
                }
            }
        }
        if nr_digits == 0 {
            self.report(errors::HVML_ABSENCE_OF_DIGITS_IN_NUMERIC_CHARACTER_REFERENCE);
            self.carrier_push_str(if hex { "&#x" } else { "&#" });
            return;
        }
        let (ch, defect) = charref::check_numeric(self.char_ref_code);
        if let Some(code) = defect {
            self.report(code);
        }
        self.carrier_push_char(ch);
    }

    // ---- embedded expressions ------------------------------------------

    fn enter_ejson(&mut self, carrier: Carrier, exit: State) {
        self.ejson_carrier = carrier;
        self.ejson_exit = exit;
        self.prev_separator = '\0';
        self.nr_quoted = 0;
    }

    fn push_frame(&mut self, frame: VcmFrame, delim: char) -> bool {
        if self.ejson_stack.len() >= self.max_depth {
            self.report(errors::EJSON_MAX_DEPTH_EXCEEDED);
            self.ejson_recover();
            return false;
        }
        self.vcm_stack.push(frame);
        self.ejson_stack.push(delim);
        true
    }

    /// Abandon the expression under construction and fall back to the
    /// carrier context.
    fn ejson_recover(&mut self) {
        tracing::debug!(
            depth = self.ejson_stack.len(),
            nr_quoted = self.nr_quoted,
            "abandoning embedded expression"
        );
        self.drain_vcm_stack();
        self.ejson_stack.clear();
        self.string_pieces.clear();
        self.var_chain = None;
        self.temp_buffer.reset();
        self.string_buffer.reset();
        self.prev_separator = '\0';
        self.state = self.ejson_exit;
    }

    /// Attach a completed value to the innermost open node, or deliver it
    /// to the carrier when no node is open.
    fn finish_value(&mut self, node: VcmNode) {
        self.prev_separator = '\0';
        match self.vcm_stack.last_mut() {
            Some(VcmFrame::Object { key, pairs }) => {
                match key.take() {
                    None => {
                        *key = Some(node);
                        self.state = State::EjsonAfterKey;
                    }
                    Some(k) => {
                        pairs.push((k, node));
                        self.state = State::EjsonAfterValue;
                    }
                }
            }
            Some(VcmFrame::Array { items }) => {
                items.push(node);
                self.state = State::EjsonAfterValue;
            }
            Some(VcmFrame::CallArgs { args, .. }) => {
                args.push(node);
                self.state = State::EjsonAfterValue;
            }
            None => {
                self.carrier_push_piece(node);
                self.state = self.ejson_exit;
            }
        }
    }

    /// Close the innermost container; `closer` selects which kind must be
    /// on top.
    fn close_frame(&mut self, closer: char) {
        let matches_top = matches!(
            (self.ejson_stack.last().copied(), closer),
            (Some('{'), '}') | (Some('['), ']') | (Some('('), ')')
        );
        if !matches_top {
            let code = match closer {
                '}' => errors::EJSON_UNEXPECTED_RIGHT_BRACE,
                ']' => errors::EJSON_UNEXPECTED_RIGHT_BRACKET,
                _ => errors::EJSON_UNEXPECTED_CHARACTER,
            };
            self.report(code);
            self.ejson_recover();
            return;
        }
        self.ejson_stack.pop();
        let node = match self.vcm_stack.pop() {
            Some(VcmFrame::Object { pairs, key }) => {
                if key.is_some() {
                    self.report(errors::EJSON_UNEXPECTED_RIGHT_BRACE);
                }
                VcmNode::ObjectLit(pairs)
            }
            Some(VcmFrame::Array { items }) => VcmNode::ArrayLit(items),
            Some(VcmFrame::CallArgs { callee, args }) => VcmNode::Call {
                callee: Box::new(callee),
                args,
            },
            None => {
                self.ejson_recover();
                return;
            }
        };
        self.finish_value(node);
    }

    fn begin_string(&mut self, quote: char) {
        self.string_quote = quote;
        self.string_buffer.reset();
        self.string_pieces.clear();
        self.nr_quoted += 1;
        self.state = State::EjsonString;
    }

    fn finish_string(&mut self) {
        let node = if self.string_pieces.is_empty() {
            VcmNode::Literal(Variant::string(self.string_buffer.take_string()))
        } else {
            if !self.string_buffer.is_empty() {
                let lit = self.string_buffer.take_string();
                self.string_pieces
                    .push(VcmNode::Literal(Variant::string(lit)));
            }
            VcmNode::ConcatString(std::mem::take(&mut self.string_pieces))
        };
        self.finish_value(node);
    }

    fn finish_number(&mut self) {
        let node = if self.temp_buffer.is_int() {
            let text = self.temp_buffer.as_str();
            match text.parse::<i64>() {
                Ok(n) => VcmNode::Literal(Variant::longint(n)),
                Err(_) => match text.parse::<u64>() {
                    Ok(n) => VcmNode::Literal(Variant::ulongint(n)),
                    Err(_) => match text.parse::<f64>() {
                        Ok(n) => VcmNode::Literal(Variant::number(n)),
                        Err(_) => {
                            self.report(errors::EJSON_BAD_NUMBER);
                            self.temp_buffer.reset();
                            self.ejson_recover();
                            return;
                        }
                    },
                },
            }
        } else if self.temp_buffer.is_number() {
            match self.temp_buffer.as_str().parse::<f64>() {
                Ok(n) => VcmNode::Literal(Variant::number(n)),
                Err(_) => {
                    self.report(errors::EJSON_BAD_NUMBER);
                    self.temp_buffer.reset();
                    self.ejson_recover();
                    return;
                }
            }
        } else {
            self.report(errors::EJSON_BAD_NUMBER);
            self.temp_buffer.reset();
            self.ejson_recover();
            return;
        };
        self.temp_buffer.reset();
        self.finish_value(node);
    }

    fn finish_keyword(&mut self) {
        let node = match self.temp_buffer.as_str() {
            "true" => VcmNode::Literal(Variant::boolean(true)),
            "false" => VcmNode::Literal(Variant::boolean(false)),
            "null" => VcmNode::Literal(Variant::Null),
            "undefined" => VcmNode::Literal(Variant::Undefined),
            _ => {
                self.report(errors::EJSON_UNEXPECTED_KEYWORD);
                self.temp_buffer.reset();
                self.ejson_recover();
                return;
            }
        };
        self.temp_buffer.reset();
        self.finish_value(node);
    }

    /// Fold the pending name segment into the variable chain.
    fn var_push_segment(&mut self) -> bool {
        if self.temp_buffer.is_empty() {
            self.report(errors::EJSON_BAD_VARIABLE_NAME);
            self.ejson_recover();
            return false;
        }
        let segment = self.temp_buffer.take_string();
        self.var_chain = Some(match self.var_chain.take() {
            None => VcmNode::VarRef(segment),
            Some(base) => VcmNode::GetMember {
                base: Box::new(base),
                member: Box::new(VcmNode::Literal(Variant::string(segment))),
            },
        });
        true
    }

    /// The chain is complete; deliver it wherever the `$` appeared.
    fn finish_variable(&mut self) {
        let Some(chain) = self.var_chain.take() else {
            self.ejson_recover();
            return;
        };
        match self.var_return {
            VarReturn::InString => {
                if !self.string_buffer.is_empty() {
                    let lit = self.string_buffer.take_string();
                    self.string_pieces
                        .push(VcmNode::Literal(Variant::string(lit)));
                }
                self.string_pieces.push(chain);
                self.state = State::EjsonString;
            }
            VarReturn::Expression => self.finish_value(chain),
        }
    }

    // ---- the step function ---------------------------------------------

    /// One transition. `None` input is end-of-stream.
    fn step(&mut self, ch: Option<char>) -> Option<Token> {
        match self.state {
            State::Data => match ch {
                Some('<') => {
                    if !self.text_literal.is_empty() || !self.text_pieces.is_empty() {
                        self.reader.rewind(1);
                        return self.flush_text();
                    }
                    self.state = State::TagOpen;
                    None
                }
                Some('&') => {
                    self.consume_char_ref(Carrier::Text);
                    None
                }
                Some('{') => {
                    self.enter_ejson(Carrier::Text, State::Data);
                    if self.push_frame(
                        VcmFrame::Object {
                            pairs: Vec::new(),
                            key: None,
                        },
                        '{',
                    ) {
                        self.state = State::EjsonObjectKey;
                    }
                    None
                }
                Some('[') => {
                    self.enter_ejson(Carrier::Text, State::Data);
                    if self.push_frame(VcmFrame::Array { items: Vec::new() }, '[') {
                        self.state = State::EjsonValue;
                    }
                    None
                }
                Some('$') => {
                    self.enter_ejson(Carrier::Text, State::Data);
                    self.var_chain = None;
                    self.var_return = VarReturn::Expression;
                    self.temp_buffer.reset();
                    self.state = State::EjsonVariable;
                    None
                }
                Some('\0') => {
                    self.report(errors::HVML_UNEXPECTED_NULL_CHARACTER);
                    self.text_literal.append_char(charref::REPLACEMENT);
                    None
                }
                Some(c) => {
                    self.text_literal.append_char(c);
                    None
                }
                None => self.flush_text(),
            },

            State::TagOpen => match ch {
                Some('!') => {
                    self.state = State::MarkupDeclarationOpen;
                    None
                }
                Some('/') => {
                    self.state = State::EndTagOpen;
                    None
                }
                Some(c) if c.is_ascii_alphabetic() => {
                    self.begin_tag(false);
                    self.reader.rewind(1);
                    self.state = State::TagName;
                    None
                }
                Some(_) => {
                    self.report(errors::HVML_INVALID_FIRST_CHARACTER_OF_TAG_NAME);
                    self.text_literal.append_char('<');
                    self.reader.rewind(1);
                    self.state = State::Data;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_BEFORE_TAG_NAME);
                    self.text_literal.append_char('<');
                    self.state = State::Data;
                    self.flush_text()
                }
            },

            State::EndTagOpen => match ch {
                Some(c) if c.is_ascii_alphabetic() => {
                    self.begin_tag(true);
                    self.reader.rewind(1);
                    self.state = State::TagName;
                    None
                }
                Some('>') => {
                    self.report(errors::HVML_MISSING_END_TAG_NAME);
                    self.state = State::Data;
                    None
                }
                Some(_) => {
                    self.report(errors::HVML_INVALID_FIRST_CHARACTER_OF_TAG_NAME);
                    self.reader.rewind(1);
                    self.comment.reset();
                    self.state = State::BogusComment;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_BEFORE_TAG_NAME);
                    self.text_literal.append_str("</");
                    self.state = State::Data;
                    self.flush_text()
                }
            },

            State::TagName => match ch {
                Some(c) if c.is_whitespace() => {
                    self.classify_tag();
                    self.state = State::BeforeAttributeName;
                    None
                }
                Some('/') => {
                    self.classify_tag();
                    self.state = State::SelfClosingStartTag;
                    None
                }
                Some('>') => {
                    self.classify_tag();
                    Some(self.emit_tag())
                }
                Some('\0') => {
                    self.report(errors::HVML_UNEXPECTED_NULL_CHARACTER);
                    self.tag_name.append_char(charref::REPLACEMENT);
                    None
                }
                Some(c) => {
                    self.tag_name.append_char(c.to_ascii_lowercase());
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_TAG);
                    self.eof_returned = true;
                    Some(Token::Eof)
                }
            },

            State::BeforeAttributeName => match ch {
                Some(c) if c.is_whitespace() => None,
                Some('/') => {
                    self.state = State::SelfClosingStartTag;
                    None
                }
                Some('>') => Some(self.emit_tag()),
                Some('=') => {
                    self.report(errors::HVML_UNEXPECTED_EQUALS_SIGN_BEFORE_ATTRIBUTE_NAME);
                    self.begin_attr();
                    self.attr_name.append_char('=');
                    self.state = State::AttributeName;
                    None
                }
                Some(_) => {
                    self.begin_attr();
                    self.reader.rewind(1);
                    self.state = State::AttributeName;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_TAG);
                    self.eof_returned = true;
                    Some(Token::Eof)
                }
            },

            State::AttributeName => match ch {
                Some(c) if c.is_whitespace() => {
                    self.state = State::AfterAttributeName;
                    None
                }
                Some('/') | Some('>') => {
                    self.reader.rewind(1);
                    self.state = State::AfterAttributeName;
                    None
                }
                Some('=') => {
                    self.state = State::BeforeAttributeValue;
                    None
                }
                Some(c @ ('"' | '\'' | '<')) => {
                    self.report(errors::HVML_UNEXPECTED_CHARACTER_IN_ATTRIBUTE_NAME);
                    self.attr_name.append_char(c);
                    None
                }
                Some('\0') => {
                    self.report(errors::HVML_UNEXPECTED_NULL_CHARACTER);
                    self.attr_name.append_char(charref::REPLACEMENT);
                    None
                }
                Some(c) => {
                    self.attr_name.append_char(c.to_ascii_lowercase());
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_TAG);
                    self.eof_returned = true;
                    Some(Token::Eof)
                }
            },

            State::AfterAttributeName => match ch {
                Some(c) if c.is_whitespace() => None,
                Some('/') => {
                    self.finish_attr();
                    self.state = State::SelfClosingStartTag;
                    None
                }
                Some('=') => {
                    self.state = State::BeforeAttributeValue;
                    None
                }
                Some('>') => Some(self.emit_tag()),
                Some(_) => {
                    self.finish_attr();
                    self.begin_attr();
                    self.reader.rewind(1);
                    self.state = State::AttributeName;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_TAG);
                    self.eof_returned = true;
                    Some(Token::Eof)
                }
            },

            State::BeforeAttributeValue => match ch {
                Some(c) if c.is_whitespace() => None,
                Some('"') => {
                    self.attr_has_value = true;
                    self.state = State::AttributeValueDq;
                    None
                }
                Some('\'') => {
                    self.attr_has_value = true;
                    self.state = State::AttributeValueSq;
                    None
                }
                Some('>') => {
                    self.report(errors::HVML_MISSING_ATTRIBUTE_VALUE);
                    self.attr_has_value = true;
                    Some(self.emit_tag())
                }
                Some(_) => {
                    self.attr_has_value = true;
                    self.reader.rewind(1);
                    self.state = State::AttributeValueUnq;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_TAG);
                    self.eof_returned = true;
                    Some(Token::Eof)
                }
            },

            State::AttributeValueDq | State::AttributeValueSq => {
                let quote = if self.state == State::AttributeValueDq {
                    '"'
                } else {
                    '\''
                };
                match ch {
                    Some(c) if c == quote => {
                        self.state = State::AfterAttributeValueQuoted;
                        None
                    }
                    Some('&') if !self.tag_has_raw_attr => {
                        self.consume_char_ref(Carrier::Attr);
                        None
                    }
                    Some('$') if !self.tag_has_raw_attr => {
                        self.enter_ejson(Carrier::Attr, self.state);
                        self.var_chain = None;
                        self.var_return = VarReturn::Expression;
                        self.temp_buffer.reset();
                        self.state = State::EjsonVariable;
                        None
                    }
                    Some(c @ ('{' | '['))
                        if !self.tag_has_raw_attr
                            && self.attr_literal.is_empty()
                            && self.attr_pieces.is_empty() =>
                    {
                        let exit = self.state;
                        self.enter_ejson(Carrier::Attr, exit);
                        if c == '{' {
                            if self.push_frame(
                                VcmFrame::Object {
                                    pairs: Vec::new(),
                                    key: None,
                                },
                                '{',
                            ) {
                                self.state = State::EjsonObjectKey;
                            }
                        } else if self.push_frame(VcmFrame::Array { items: Vec::new() }, '[')
                        {
                            self.state = State::EjsonValue;
                        }
                        None
                    }
                    Some('\0') => {
                        self.report(errors::HVML_UNEXPECTED_NULL_CHARACTER);
                        self.attr_literal.append_char(charref::REPLACEMENT);
                        None
                    }
                    Some(c) => {
                        self.attr_literal.append_char(c);
                        None
                    }
                    None => {
                        self.report(errors::HVML_EOF_IN_TAG);
                        self.eof_returned = true;
                        Some(Token::Eof)
                    }
                }
            }

            State::AttributeValueUnq => match ch {
                Some(c) if c.is_whitespace() => {
                    self.finish_attr();
                    self.begin_attr();
                    self.state = State::BeforeAttributeName;
                    None
                }
                Some('>') => Some(self.emit_tag()),
                Some('&') if !self.tag_has_raw_attr => {
                    self.consume_char_ref(Carrier::Attr);
                    None
                }
                Some('$')
                    if !self.tag_has_raw_attr
                        && self.attr_literal.is_empty()
                        && self.attr_pieces.is_empty() =>
                {
                    self.enter_ejson(Carrier::Attr, State::AttributeValueUnq);
                    self.var_chain = None;
                    self.var_return = VarReturn::Expression;
                    self.temp_buffer.reset();
                    self.state = State::EjsonVariable;
                    None
                }
                Some(c @ ('"' | '\'' | '<' | '=' | '`')) => {
                    self.report(errors::HVML_UNEXPECTED_CHARACTER_IN_UNQUOTED_ATTRIBUTE_VALUE);
                    self.attr_literal.append_char(c);
                    None
                }
                Some(c) => {
                    self.attr_literal.append_char(c);
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_TAG);
                    self.eof_returned = true;
                    Some(Token::Eof)
                }
            },

            State::AfterAttributeValueQuoted => match ch {
                Some(c) if c.is_whitespace() => {
                    self.finish_attr();
                    self.begin_attr();
                    self.state = State::BeforeAttributeName;
                    None
                }
                Some('/') => {
                    self.finish_attr();
                    self.state = State::SelfClosingStartTag;
                    None
                }
                Some('>') => Some(self.emit_tag()),
                Some(_) => {
                    self.report(errors::HVML_MISSING_WHITESPACE_BETWEEN_ATTRIBUTES);
                    self.finish_attr();
                    self.begin_attr();
                    self.reader.rewind(1);
                    self.state = State::BeforeAttributeName;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_TAG);
                    self.eof_returned = true;
                    Some(Token::Eof)
                }
            },

            State::SelfClosingStartTag => match ch {
                Some('>') => {
                    self.tag_self_closing = true;
                    Some(self.emit_tag())
                }
                Some(_) => {
                    self.report(errors::HVML_UNEXPECTED_SOLIDUS_IN_TAG);
                    self.reader.rewind(1);
                    self.state = State::BeforeAttributeName;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_TAG);
                    self.eof_returned = true;
                    Some(Token::Eof)
                }
            },

            State::MarkupDeclarationOpen => {
                // The dispatch needs lookahead, not single characters.
                self.reader.rewind(ch.map(|_| 1).unwrap_or(0));
                if self.reader.consume_if_matches("--", false) {
                    self.comment.reset();
                    self.state = State::CommentStart;
                } else if self.reader.consume_if_matches("DOCTYPE", true) {
                    self.state = State::Doctype;
                } else {
                    self.report(errors::HVML_INCORRECTLY_OPENED_COMMENT);
                    self.comment.reset();
                    self.state = State::BogusComment;
                }
                None
            }

            State::BogusComment => match ch {
                Some('>') => Some(self.emit_comment()),
                Some('\0') => {
                    self.comment.append_char(charref::REPLACEMENT);
                    None
                }
                Some(c) => {
                    self.comment.append_char(c);
                    None
                }
                None => Some(self.emit_comment()),
            },

            State::CommentStart => match ch {
                Some('-') => {
                    self.state = State::CommentStartDash;
                    None
                }
                Some('>') => {
                    self.report(errors::HVML_ABRUPT_CLOSING_OF_EMPTY_COMMENT);
                    Some(self.emit_comment())
                }
                Some(_) => {
                    self.reader.rewind(1);
                    self.state = State::Comment;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_COMMENT);
                    Some(self.emit_comment())
                }
            },

            State::CommentStartDash => match ch {
                Some('-') => {
                    self.state = State::CommentEnd;
                    None
                }
                Some('>') => {
                    self.report(errors::HVML_ABRUPT_CLOSING_OF_EMPTY_COMMENT);
                    Some(self.emit_comment())
                }
                Some(_) => {
                    self.comment.append_char('-');
                    self.reader.rewind(1);
                    self.state = State::Comment;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_COMMENT);
                    Some(self.emit_comment())
                }
            },

            State::Comment => match ch {
                Some('<') => {
                    self.comment.append_char('<');
                    self.state = State::CommentLessThan;
                    None
                }
                Some('-') => {
                    self.state = State::CommentEndDash;
                    None
                }
                Some('\0') => {
                    self.report(errors::HVML_UNEXPECTED_NULL_CHARACTER);
                    self.comment.append_char(charref::REPLACEMENT);
                    None
                }
                Some(c) => {
                    self.comment.append_char(c);
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_COMMENT);
                    Some(self.emit_comment())
                }
            },

            State::CommentLessThan => match ch {
                Some('!') => {
                    self.comment.append_char('!');
                    self.state = State::CommentLessThanBang;
                    None
                }
                Some('<') => {
                    self.comment.append_char('<');
                    None
                }
                Some(_) | None => {
                    self.reader.rewind(ch.map(|_| 1).unwrap_or(0));
                    self.state = State::Comment;
                    None
                }
            },

            State::CommentLessThanBang => match ch {
                Some('-') => {
                    self.state = State::CommentLessThanBangDash;
                    None
                }
                Some(_) | None => {
                    self.reader.rewind(ch.map(|_| 1).unwrap_or(0));
                    self.state = State::Comment;
                    None
                }
            },

            State::CommentLessThanBangDash => match ch {
                Some('-') => {
                    self.state = State::CommentLessThanBangDashDash;
                    None
                }
                Some(_) | None => {
                    self.reader.rewind(ch.map(|_| 1).unwrap_or(0));
                    self.state = State::CommentEndDash;
                    None
                }
            },

            State::CommentLessThanBangDashDash => match ch {
                Some('>') | None => {
                    self.reader.rewind(ch.map(|_| 1).unwrap_or(0));
                    self.state = State::CommentEnd;
                    None
                }
                Some(_) => {
                    self.report(errors::HVML_NESTED_COMMENT);
                    self.reader.rewind(1);
                    self.state = State::CommentEnd;
                    None
                }
            },

            State::CommentEndDash => match ch {
                Some('-') => {
                    self.state = State::CommentEnd;
                    None
                }
                Some(_) => {
                    self.comment.append_char('-');
                    self.reader.rewind(1);
                    self.state = State::Comment;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_COMMENT);
                    Some(self.emit_comment())
                }
            },

            State::CommentEnd => match ch {
                Some('>') => Some(self.emit_comment()),
                Some('!') => {
                    self.state = State::CommentEndBang;
                    None
                }
                Some('-') => {
                    self.comment.append_char('-');
                    None
                }
                Some(_) => {
                    self.comment.append_str("--");
                    self.reader.rewind(1);
                    self.state = State::Comment;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_COMMENT);
                    Some(self.emit_comment())
                }
            },

            State::CommentEndBang => match ch {
                Some('-') => {
                    self.comment.append_str("--!");
                    self.state = State::CommentEndDash;
                    None
                }
                Some('>') => {
                    self.report(errors::HVML_INCORRECTLY_CLOSED_COMMENT);
                    Some(self.emit_comment())
                }
                Some(_) => {
                    self.comment.append_str("--!");
                    self.reader.rewind(1);
                    self.state = State::Comment;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_COMMENT);
                    Some(self.emit_comment())
                }
            },

            State::Doctype => match ch {
                Some(c) if c.is_whitespace() => {
                    self.state = State::BeforeDoctypeName;
                    None
                }
                Some('>') => {
                    self.reader.rewind(1);
                    self.state = State::BeforeDoctypeName;
                    None
                }
                Some(_) => {
                    self.report(errors::HVML_MISSING_WHITESPACE_BEFORE_DOCTYPE_NAME);
                    self.reader.rewind(1);
                    self.state = State::BeforeDoctypeName;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_DOCTYPE);
                    Some(self.emit_doctype())
                }
            },

            State::BeforeDoctypeName => match ch {
                Some(c) if c.is_whitespace() => None,
                Some('>') => {
                    self.report(errors::HVML_MISSING_DOCTYPE_NAME);
                    Some(self.emit_doctype())
                }
                Some(c) => {
                    self.doctype_name.reset();
                    self.doctype_name.append_char(c.to_ascii_lowercase());
                    self.state = State::DoctypeName;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_DOCTYPE);
                    Some(self.emit_doctype())
                }
            },

            State::DoctypeName => match ch {
                Some(c) if c.is_whitespace() => {
                    self.state = State::AfterDoctypeName;
                    None
                }
                Some('>') => Some(self.emit_doctype()),
                Some(c) => {
                    self.doctype_name.append_char(c.to_ascii_lowercase());
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_DOCTYPE);
                    Some(self.emit_doctype())
                }
            },

            State::AfterDoctypeName => match ch {
                Some(c) if c.is_whitespace() => None,
                Some('>') => Some(self.emit_doctype()),
                Some(_) => {
                    self.reader.rewind(1);
                    if self.reader.consume_if_matches("PUBLIC", true) {
                        self.state = State::AfterDoctypePublicKeyword;
                    } else if self.reader.consume_if_matches("SYSTEM", true) {
                        self.state = State::AfterDoctypeSystemKeyword;
                    } else {
                        self.report(
                            errors::HVML_INVALID_CHARACTER_SEQUENCE_AFTER_DOCTYPE_NAME,
                        );
                        self.reader.next_char();
                        self.state = State::BogusDoctype;
                    }
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_DOCTYPE);
                    Some(self.emit_doctype())
                }
            },

            State::AfterDoctypePublicKeyword => match ch {
                Some(c) if c.is_whitespace() => {
                    self.state = State::BeforeDoctypePublicId;
                    None
                }
                Some('"') => {
                    self.string_buffer.reset();
                    self.state = State::DoctypePublicIdDq;
                    None
                }
                Some('\'') => {
                    self.string_buffer.reset();
                    self.state = State::DoctypePublicIdSq;
                    None
                }
                Some('>') => {
                    self.report(errors::HVML_ABRUPT_DOCTYPE_PUBLIC_ID);
                    Some(self.emit_doctype())
                }
                Some(_) => {
                    self.report(errors::HVML_MISSING_QUOTE_BEFORE_DOCTYPE_PUBLIC_ID);
                    self.reader.rewind(1);
                    self.state = State::BogusDoctype;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_DOCTYPE);
                    Some(self.emit_doctype())
                }
            },

            State::BeforeDoctypePublicId => match ch {
                Some(c) if c.is_whitespace() => None,
                Some('"') => {
                    self.string_buffer.reset();
                    self.state = State::DoctypePublicIdDq;
                    None
                }
                Some('\'') => {
                    self.string_buffer.reset();
                    self.state = State::DoctypePublicIdSq;
                    None
                }
                Some('>') => {
                    self.report(errors::HVML_ABRUPT_DOCTYPE_PUBLIC_ID);
                    Some(self.emit_doctype())
                }
                Some(_) => {
                    self.report(errors::HVML_MISSING_QUOTE_BEFORE_DOCTYPE_PUBLIC_ID);
                    self.reader.rewind(1);
                    self.state = State::BogusDoctype;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_DOCTYPE);
                    Some(self.emit_doctype())
                }
            },

            State::DoctypePublicIdDq | State::DoctypePublicIdSq => {
                let quote = if self.state == State::DoctypePublicIdDq {
                    '"'
                } else {
                    '\''
                };
                match ch {
                    Some(c) if c == quote => {
                        self.doctype_public = Some(self.string_buffer.take_string());
                        self.state = State::AfterDoctypePublicId;
                        None
                    }
                    Some('>') => {
                        self.report(errors::HVML_ABRUPT_DOCTYPE_PUBLIC_ID);
                        self.doctype_public = Some(self.string_buffer.take_string());
                        Some(self.emit_doctype())
                    }
                    Some(c) => {
                        self.string_buffer.append_char(c);
                        None
                    }
                    None => {
                        self.report(errors::HVML_EOF_IN_DOCTYPE);
                        self.doctype_public = Some(self.string_buffer.take_string());
                        Some(self.emit_doctype())
                    }
                }
            }

            State::AfterDoctypePublicId => match ch {
                Some(c) if c.is_whitespace() => {
                    self.state = State::BetweenDoctypePublicAndSystem;
                    None
                }
                Some('>') => Some(self.emit_doctype()),
                Some('"') => {
                    self.string_buffer.reset();
                    self.state = State::DoctypeSystemIdDq;
                    None
                }
                Some('\'') => {
                    self.string_buffer.reset();
                    self.state = State::DoctypeSystemIdSq;
                    None
                }
                Some(_) => {
                    self.report(errors::HVML_MISSING_QUOTE_BEFORE_DOCTYPE_SYSTEM_ID);
                    self.reader.rewind(1);
                    self.state = State::BogusDoctype;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_DOCTYPE);
                    Some(self.emit_doctype())
                }
            },

            State::BetweenDoctypePublicAndSystem => match ch {
                Some(c) if c.is_whitespace() => None,
                Some('>') => Some(self.emit_doctype()),
                Some('"') => {
                    self.string_buffer.reset();
                    self.state = State::DoctypeSystemIdDq;
                    None
                }
                Some('\'') => {
                    self.string_buffer.reset();
                    self.state = State::DoctypeSystemIdSq;
                    None
                }
                Some(_) => {
                    self.report(errors::HVML_MISSING_QUOTE_BEFORE_DOCTYPE_SYSTEM_ID);
                    self.reader.rewind(1);
                    self.state = State::BogusDoctype;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_DOCTYPE);
                    Some(self.emit_doctype())
                }
            },

            State::AfterDoctypeSystemKeyword => match ch {
                Some(c) if c.is_whitespace() => {
                    self.state = State::BeforeDoctypeSystemId;
                    None
                }
                Some('"') => {
                    self.string_buffer.reset();
                    self.state = State::DoctypeSystemIdDq;
                    None
                }
                Some('\'') => {
                    self.string_buffer.reset();
                    self.state = State::DoctypeSystemIdSq;
                    None
                }
                Some('>') => {
                    self.report(errors::HVML_MISSING_DOCTYPE_SYSTEM_ID);
                    Some(self.emit_doctype())
                }
                Some(_) => {
                    self.report(errors::HVML_MISSING_QUOTE_BEFORE_DOCTYPE_SYSTEM_ID);
                    self.reader.rewind(1);
                    self.state = State::BogusDoctype;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_DOCTYPE);
                    Some(self.emit_doctype())
                }
            },

            State::BeforeDoctypeSystemId => match ch {
                Some(c) if c.is_whitespace() => None,
                Some('"') => {
                    self.string_buffer.reset();
                    self.state = State::DoctypeSystemIdDq;
                    None
                }
                Some('\'') => {
                    self.string_buffer.reset();
                    self.state = State::DoctypeSystemIdSq;
                    None
                }
                Some('>') => {
                    self.report(errors::HVML_MISSING_DOCTYPE_SYSTEM_ID);
                    Some(self.emit_doctype())
                }
                Some(_) => {
                    self.report(errors::HVML_MISSING_QUOTE_BEFORE_DOCTYPE_SYSTEM_ID);
                    self.reader.rewind(1);
                    self.state = State::BogusDoctype;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_DOCTYPE);
                    Some(self.emit_doctype())
                }
            },

            State::DoctypeSystemIdDq | State::DoctypeSystemIdSq => {
                let quote = if self.state == State::DoctypeSystemIdDq {
                    '"'
                } else {
                    '\''
                };
                match ch {
                    Some(c) if c == quote => {
                        self.doctype_system = Some(self.string_buffer.take_string());
                        self.state = State::AfterDoctypeSystemId;
                        None
                    }
                    Some('>') => {
                        self.report(errors::HVML_ABRUPT_DOCTYPE_SYSTEM_ID);
                        self.doctype_system = Some(self.string_buffer.take_string());
                        Some(self.emit_doctype())
                    }
                    Some(c) => {
                        self.string_buffer.append_char(c);
                        None
                    }
                    None => {
                        self.report(errors::HVML_EOF_IN_DOCTYPE);
                        self.doctype_system = Some(self.string_buffer.take_string());
                        Some(self.emit_doctype())
                    }
                }
            }

            State::AfterDoctypeSystemId => match ch {
                Some(c) if c.is_whitespace() => None,
                Some('>') => Some(self.emit_doctype()),
                Some(_) => {
                    self.report(errors::HVML_UNEXPECTED_CHARACTER_AFTER_DOCTYPE_SYSTEM_ID);
                    self.reader.rewind(1);
                    self.state = State::BogusDoctype;
                    None
                }
                None => {
                    self.report(errors::HVML_EOF_IN_DOCTYPE);
                    Some(self.emit_doctype())
                }
            },

            State::BogusDoctype => match ch {
                Some('>') => Some(self.emit_doctype()),
                Some(_) => None,
                None => Some(self.emit_doctype()),
            },

            // ---- embedded expressions ----------------------------------
            State::EjsonValue => match ch {
                Some(c) if c.is_whitespace() => None,
                Some('{') => {
                    if self.push_frame(
                        VcmFrame::Object {
                            pairs: Vec::new(),
                            key: None,
                        },
                        '{',
                    ) {
                        self.state = State::EjsonObjectKey;
                    }
                    None
                }
                Some('[') => {
                    if self.push_frame(VcmFrame::Array { items: Vec::new() }, '[') {
                        self.state = State::EjsonValue;
                    }
                    None
                }
                Some(']') => {
                    self.close_frame(']');
                    None
                }
                Some(')') => {
                    self.close_frame(')');
                    None
                }
                Some(c @ ('"' | '\'')) => {
                    self.begin_string(c);
                    None
                }
                Some(c) if c.is_ascii_digit() || c == '-' || c == '+' => {
                    self.temp_buffer.reset();
                    self.temp_buffer.append_char(c);
                    self.state = State::EjsonNumber;
                    None
                }
                Some('$') => {
                    self.var_chain = None;
                    self.var_return = VarReturn::Expression;
                    self.temp_buffer.reset();
                    self.state = State::EjsonVariable;
                    None
                }
                Some(c) if c.is_ascii_alphabetic() => {
                    self.temp_buffer.reset();
                    self.temp_buffer.append_char(c);
                    self.state = State::EjsonKeyword;
                    None
                }
                Some(',') => {
                    self.report(errors::EJSON_UNEXPECTED_COMMA);
                    self.ejson_recover();
                    None
                }
                Some('<') if self.ejson_stack.is_empty() => {
                    self.reader.rewind(1);
                    self.ejson_recover();
                    None
                }
                Some(_) => {
                    self.report(errors::EJSON_UNEXPECTED_CHARACTER);
                    self.ejson_recover();
                    None
                }
                None => {
                    self.report(errors::EJSON_UNEXPECTED_EOF);
                    self.ejson_recover();
                    None
                }
            },

            State::EjsonAfterValue => match ch {
                Some(c) if c.is_whitespace() => None,
                Some(',') => {
                    if self.prev_separator == ',' {
                        self.report(errors::EJSON_UNEXPECTED_COMMA);
                        self.ejson_recover();
                        return None;
                    }
                    self.prev_separator = ',';
                    self.state = match self.vcm_stack.last() {
                        Some(VcmFrame::Object { .. }) => State::EjsonObjectKey,
                        _ => State::EjsonValue,
                    };
                    None
                }
                Some('}') => {
                    self.close_frame('}');
                    None
                }
                Some(']') => {
                    self.close_frame(']');
                    None
                }
                Some(')') => {
                    self.close_frame(')');
                    None
                }
                Some(_) => {
                    self.report(errors::EJSON_UNEXPECTED_CHARACTER);
                    self.ejson_recover();
                    None
                }
                None => {
                    self.report(errors::EJSON_UNEXPECTED_EOF);
                    self.ejson_recover();
                    None
                }
            },

            State::EjsonObjectKey => match ch {
                Some(c) if c.is_whitespace() => None,
                Some('}') => {
                    self.close_frame('}');
                    None
                }
                Some(c @ ('"' | '\'')) => {
                    self.begin_string(c);
                    None
                }
                Some('$') => {
                    self.var_chain = None;
                    self.var_return = VarReturn::Expression;
                    self.temp_buffer.reset();
                    self.state = State::EjsonVariable;
                    None
                }
                Some(c) if c.is_ascii_alphanumeric() || c == '_' || c == '-' => {
                    // Bare key.
                    self.temp_buffer.reset();
                    self.temp_buffer.append_char(c);
                    loop {
                        match self.reader.next_char() {
                            Some(k) if k.is_ascii_alphanumeric() || k == '_' || k == '-' => {
                                self.temp_buffer.append_char(k);
                            }
                            Some(other) => {
                                self.reader.rewind(1);
                                let _ = other;
                                break;
                            }
                            None => break,
                        }
                    }
                    let key = self.temp_buffer.take_string();
                    self.finish_value(VcmNode::Literal(Variant::string(key)));
                    None
                }
                Some(',') => {
                    self.report(errors::EJSON_UNEXPECTED_COMMA);
                    self.ejson_recover();
                    None
                }
                Some(_) => {
                    self.report(errors::EJSON_UNEXPECTED_KEY_NAME);
                    self.ejson_recover();
                    None
                }
                None => {
                    self.report(errors::EJSON_UNEXPECTED_EOF);
                    self.ejson_recover();
                    None
                }
            },

            State::EjsonAfterKey => match ch {
                Some(c) if c.is_whitespace() => None,
                Some(':') => {
                    self.prev_separator = ':';
                    self.state = State::EjsonValue;
                    None
                }
                Some(_) => {
                    self.report(errors::EJSON_UNEXPECTED_CHARACTER);
                    self.ejson_recover();
                    None
                }
                None => {
                    self.report(errors::EJSON_UNEXPECTED_EOF);
                    self.ejson_recover();
                    None
                }
            },

            State::EjsonString => match ch {
                Some(c) if c == self.string_quote => {
                    self.finish_string();
                    None
                }
                Some('\\') => {
                    self.state = State::EjsonStringEscape;
                    None
                }
                Some('$') if self.string_quote == '"' => {
                    self.var_chain = None;
                    self.var_return = VarReturn::InString;
                    self.temp_buffer.reset();
                    self.state = State::EjsonVariable;
                    None
                }
                Some(c) => {
                    self.string_buffer.append_char(c);
                    None
                }
                None => {
                    self.report(errors::EJSON_UNEXPECTED_EOF);
                    self.ejson_recover();
                    None
                }
            },

            State::EjsonStringEscape => {
                let decoded = match ch {
                    Some('"') => Some('"'),
                    Some('\'') => Some('\''),
                    Some('\\') => Some('\\'),
                    Some('/') => Some('/'),
                    Some('b') => Some('\u{08}'),
                    Some('f') => Some('\u{0c}'),
                    Some('n') => Some('\n'),
                    Some('r') => Some('\r'),
                    Some('t') => Some('\t'),
                    Some('$') => Some('$'),
                    Some('u') => {
                        let mut code = 0u32;
                        let mut ok = true;
                        for _ in 0..4 {
                            match self.reader.next_char().and_then(|h| h.to_digit(16)) {
                                Some(d) => code = code * 16 + d,
                                None => {
                                    ok = false;
                                    break;
                                }
                            }
                        }
                        if ok { char::from_u32(code) } else { None }
                    }
                    _ => None,
                };
                match decoded {
                    Some(c) => {
                        self.string_buffer.append_char(c);
                        self.state = State::EjsonString;
                    }
                    None => {
                        self.report(errors::EJSON_BAD_STRING_ESCAPE);
                        self.ejson_recover();
                    }
                }
                None
            }

            State::EjsonNumber => match ch {
                Some(c)
                    if c.is_ascii_digit()
                        || matches!(c, '.' | 'e' | 'E' | '+' | '-') =>
                {
                    self.temp_buffer.append_char(c);
                    None
                }
                Some(_) => {
                    self.reader.rewind(1);
                    self.finish_number();
                    None
                }
                None => {
                    self.finish_number();
                    None
                }
            },

            State::EjsonKeyword => match ch {
                Some(c) if c.is_ascii_alphabetic() => {
                    self.temp_buffer.append_char(c);
                    None
                }
                Some(_) => {
                    self.reader.rewind(1);
                    self.finish_keyword();
                    None
                }
                None => {
                    self.finish_keyword();
                    None
                }
            },

            State::EjsonVariable => match ch {
                // One-character special names ($?, $!, $@); the next
                // character decides whether a member chain follows.
                Some(c @ ('?' | '!' | '@')) if self.temp_buffer.is_empty() => {
                    self.temp_buffer.append_char(c);
                    None
                }
                Some(c) if c.is_ascii_alphanumeric() || c == '_' => {
                    self.temp_buffer.append_char(c);
                    None
                }
                Some(c) => {
                    if self.var_push_segment() {
                        self.after_variable_segment(Some(c));
                    }
                    None
                }
                None => {
                    if self.var_push_segment() {
                        self.after_variable_segment(None);
                    }
                    None
                }
            },

            State::EjsonMemberName => match ch {
                Some(c) if c.is_ascii_alphanumeric() || c == '_' => {
                    self.temp_buffer.append_char(c);
                    None
                }
                Some(c) => {
                    if self.temp_buffer.is_empty() {
                        self.report(errors::EJSON_BAD_VARIABLE_NAME);
                        self.ejson_recover();
                    } else if self.var_push_segment() {
                        self.after_variable_segment(Some(c));
                    }
                    None
                }
                None => {
                    if !self.temp_buffer.is_empty() && self.var_push_segment() {
                        self.after_variable_segment(None);
                    } else {
                        self.report(errors::EJSON_UNEXPECTED_EOF);
                        self.ejson_recover();
                    }
                    None
                }
            },
        }
    }

    /// A variable name segment just ended at `next`; decide whether the
    /// chain continues (`.member`, `(args)`) or completes.
    fn after_variable_segment(&mut self, next: Option<char>) {
        match next {
            Some('.') => {
                self.temp_buffer.reset();
                self.state = State::EjsonMemberName;
            }
            Some('(') if self.var_return == VarReturn::Expression => {
                let callee = self.var_chain.take().expect("chain exists at call");
                if self.push_frame(
                    VcmFrame::CallArgs {
                        callee,
                        args: Vec::new(),
                    },
                    '(',
                ) {
                    self.state = State::EjsonValue;
                }
            }
            Some(c) => {
                self.reader.rewind(1);
                let _ = c;
                self.finish_variable();
            }
            None => self.finish_variable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Tokenizer::tokenize(input)
    }

    #[test]
    fn test_smoke_paragraph() {
        errors::clear_last_error();
        let toks = tokens("<p class=\"x\">hi</p>");
        assert_eq!(
            toks,
            vec![
                Token::StartTag {
                    name: "p".into(),
                    attributes: vec![Attribute {
                        name: "class".into(),
                        value: Some(AttrValue::Literal("x".into())),
                    }],
                    self_closing: false,
                    is_operation: false,
                    has_raw_attr: false,
                },
                Token::Text(VcmNode::Literal(Variant::string("hi"))),
                Token::EndTag { name: "p".into() },
                Token::Eof,
            ]
        );
        assert_eq!(errors::last_error(), errors::OK);
    }

    #[test]
    fn test_determinism() {
        let input = "<hvml><init as=\"x\" with=\"{ 'k': 1 }\"/>text &amp; more</hvml>";
        assert_eq!(tokens(input), tokens(input));
    }

    #[test]
    fn test_operation_tag_classification() {
        let toks = tokens("<init as=\"data\"/>");
        match &toks[0] {
            Token::StartTag {
                name,
                is_operation,
                self_closing,
                ..
            } => {
                assert_eq!(name, "init");
                assert!(is_operation);
                assert!(self_closing);
            }
            other => panic!("expected start tag, got {other:?}"),
        }
        let toks = tokens("<body>");
        match &toks[0] {
            Token::StartTag { is_operation, .. } => assert!(!is_operation),
            other => panic!("expected start tag, got {other:?}"),
        }
    }

    #[test]
    fn test_named_character_reference() {
        let toks = tokens("a &amp; b");
        assert_eq!(toks[0].text_literal(), Some("a & b"));
    }

    #[test]
    fn test_named_reference_longest_match() {
        // "&ampx" resolves the legacy "amp" and keeps the x.
        let toks = tokens("&ampx");
        assert_eq!(toks[0].text_literal(), Some("&x"));
    }

    #[test]
    fn test_decimal_character_reference() {
        errors::clear_last_error();
        let toks = tokens("&#65;");
        assert_eq!(toks[0].text_literal(), Some("A"));
        assert_eq!(errors::last_error(), errors::OK);
    }

    #[test]
    fn test_hex_character_reference() {
        let toks = tokens("&#x4E2D;");
        assert_eq!(toks[0].text_literal(), Some("中"));
    }

    #[test]
    fn test_surrogate_reference_is_replaced() {
        errors::clear_last_error();
        let toks = tokens("&#xD800;");
        assert_eq!(toks[0].text_literal(), Some("\u{FFFD}"));
        assert_eq!(
            errors::last_error(),
            errors::HVML_SURROGATE_CHARACTER_REFERENCE
        );
        errors::clear_last_error();
    }

    #[test]
    fn test_comment() {
        let toks = tokens("<!-- note -->");
        assert_eq!(toks[0], Token::Comment(" note ".into()));
    }

    #[test]
    fn test_doctype_with_system_id() {
        let toks = tokens("<!DOCTYPE hvml SYSTEM \"v: MATH\">");
        assert_eq!(
            toks[0],
            Token::Doctype {
                name: "hvml".into(),
                public_id: None,
                system_id: Some("v: MATH".into()),
            }
        );
    }

    #[test]
    fn test_attr_carries_ejson_object() {
        let toks = tokens("<init with=\"{ count: 3 }\"/>");
        match &toks[0] {
            Token::StartTag { attributes, .. } => {
                assert_eq!(attributes.len(), 1);
                match &attributes[0].value {
                    Some(AttrValue::Vcm(VcmNode::ObjectLit(pairs))) => {
                        assert_eq!(pairs.len(), 1);
                        assert_eq!(
                            pairs[0].0,
                            VcmNode::Literal(Variant::string("count"))
                        );
                        assert_eq!(pairs[0].1, VcmNode::Literal(Variant::longint(3)));
                    }
                    other => panic!("expected object literal, got {other:?}"),
                }
            }
            other => panic!("expected start tag, got {other:?}"),
        }
    }

    #[test]
    fn test_text_ejson_array_with_nested_values() {
        let toks = tokens("[1, 2.5, \"s\", [true, null]]");
        match &toks[0] {
            Token::Text(VcmNode::ArrayLit(items)) => {
                assert_eq!(items.len(), 4);
                assert_eq!(items[0], VcmNode::Literal(Variant::longint(1)));
                assert_eq!(items[1], VcmNode::Literal(Variant::number(2.5)));
                assert_eq!(items[2], VcmNode::Literal(Variant::string("s")));
                match &items[3] {
                    VcmNode::ArrayLit(inner) => assert_eq!(inner.len(), 2),
                    other => panic!("expected nested array, got {other:?}"),
                }
            }
            other => panic!("expected array literal, got {other:?}"),
        }
    }

    #[test]
    fn test_variable_reference_in_text() {
        let toks = tokens("hello $user.name!");
        match &toks[0] {
            Token::Text(VcmNode::ConcatString(pieces)) => {
                assert_eq!(pieces.len(), 3);
                assert_eq!(pieces[0], VcmNode::Literal(Variant::string("hello ")));
                assert_eq!(
                    pieces[1],
                    VcmNode::GetMember {
                        base: Box::new(VcmNode::VarRef("user".into())),
                        member: Box::new(VcmNode::Literal(Variant::string("name"))),
                    }
                );
                assert_eq!(pieces[2], VcmNode::Literal(Variant::string("!")));
            }
            other => panic!("expected concat, got {other:?}"),
        }
    }

    #[test]
    fn test_variable_call_with_args() {
        let toks = tokens("$L.not(false)");
        match &toks[0] {
            Token::Text(VcmNode::Call { callee, args }) => {
                assert_eq!(
                    **callee,
                    VcmNode::GetMember {
                        base: Box::new(VcmNode::VarRef("L".into())),
                        member: Box::new(VcmNode::Literal(Variant::string("not"))),
                    }
                );
                assert_eq!(args.len(), 1);
                assert_eq!(args[0], VcmNode::Literal(Variant::boolean(false)));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_string_interpolation_in_attr() {
        let toks = tokens("<p title=\"hi $who\"/>");
        match &toks[0] {
            Token::StartTag { attributes, .. } => match &attributes[0].value {
                Some(AttrValue::Vcm(VcmNode::ConcatString(pieces))) => {
                    assert_eq!(pieces.len(), 2);
                    assert_eq!(pieces[0], VcmNode::Literal(Variant::string("hi ")));
                    assert_eq!(pieces[1], VcmNode::VarRef("who".into()));
                }
                other => panic!("expected concat value, got {other:?}"),
            },
            other => panic!("expected start tag, got {other:?}"),
        }
    }

    #[test]
    fn test_raw_attr_tag_keeps_value_verbatim() {
        let toks = tokens("<archetype name=\"t\" content=\"$x &amp; {y}\"/>");
        match &toks[0] {
            Token::StartTag {
                has_raw_attr,
                attributes,
                ..
            } => {
                assert!(has_raw_attr);
                assert_eq!(
                    attributes[1].value,
                    Some(AttrValue::Literal("$x &amp; {y}".into()))
                );
            }
            other => panic!("expected start tag, got {other:?}"),
        }
    }

    #[test]
    fn test_max_depth_is_enforced() {
        errors::clear_last_error();
        let nested = "[".repeat(40) + &"]".repeat(40);
        let _ = tokens(&nested);
        assert_eq!(errors::last_error(), errors::EJSON_MAX_DEPTH_EXCEEDED);
        errors::clear_last_error();
    }

    #[test]
    fn test_error_recovery_continues_stream() {
        errors::clear_last_error();
        // Broken expression followed by healthy markup.
        let toks = tokens("{ , }<p>ok</p>");
        assert_ne!(errors::last_error(), errors::OK);
        assert!(toks.iter().any(|t| matches!(
            t,
            Token::StartTag { name, .. } if name == "p"
        )));
        assert!(toks.iter().any(|t| t.text_literal() == Some("ok")));
        errors::clear_last_error();
    }

    #[test]
    fn test_unclosed_tag_reports_eof_in_tag() {
        errors::clear_last_error();
        let toks = tokens("<p class=");
        assert_eq!(toks.last(), Some(&Token::Eof));
        assert_eq!(errors::last_error(), errors::HVML_EOF_IN_TAG);
        errors::clear_last_error();
    }

    #[test]
    fn test_reset_clears_machine() {
        let mut tk = Tokenizer::new("<p");
        let _ = tk.next_token();
        tk.reset("<q>");
        let tok = tk.next_token();
        assert!(matches!(tok, Token::StartTag { ref name, .. } if name == "q"));
    }

    #[test]
    fn test_duplicate_attribute_dropped() {
        errors::clear_last_error();
        let toks = tokens("<p a=\"1\" a=\"2\">");
        match &toks[0] {
            Token::StartTag { attributes, .. } => {
                assert_eq!(attributes.len(), 1);
                assert_eq!(attributes[0].value, Some(AttrValue::Literal("1".into())));
            }
            other => panic!("expected start tag, got {other:?}"),
        }
        assert_eq!(errors::last_error(), errors::DUPLICATED);
        errors::clear_last_error();
    }

    #[test]
    fn test_bare_attribute() {
        let toks = tokens("<test silently>");
        match &toks[0] {
            Token::StartTag { attributes, .. } => {
                assert_eq!(attributes[0].name, "silently");
                assert_eq!(attributes[0].value, None);
            }
            other => panic!("expected start tag, got {other:?}"),
        }
    }
}
