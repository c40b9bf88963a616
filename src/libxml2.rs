//! LibXML2 FFI Wrapper Module
//!
//! Safe wrappers around the parts of libxml2 this crate needs: document parsing,
//! XPath string queries over a parsed tree, XML Schema, RelaxNG, Schematron and
//! DTD compilation and validation, catalog lookups, and structured error capture.
//!
//! ## Thread Safety Strategy
//!
//! - **Initialization** happens exactly once behind [`std::sync::Once`].
//! - **Schema compilation** is serialized through [`SCHEMA_PARSE_LOCK`]; the
//!   libxml2 schema parsers are not safe to run concurrently.
//! - **Validation** runs in parallel. Each call creates its own validation
//!   context and compiled schemas are only read.
//! - **Documents** are not `Sync`. Callers lock the owning document for the
//!   duration of a validation or query.
//! - **Error capture** uses libxml2's per-thread structured error handler, so a
//!   capture only sees errors raised on the calling thread.
//!
//! ## Network Access
//!
//! libxml2 never reaches the network on its own. Documents and schema trees are
//! parsed with `XML_PARSE_NONET`, and the process-wide external entity loader is
//! replaced with libxml2's no-network loader so schema includes and imports
//! cannot fetch remote URLs while the compile lock is held. A schema that
//! depends on such a resource fails with [`EngineError::UnreachableResource`].

use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::ptr;
use std::sync::{Arc, Once};

use libc::{c_char, c_int, c_void};
use parking_lot::Mutex;

use crate::document::Doctype;
use crate::error::{EngineError, EngineResult};
use crate::registry::{ParseErrorKind, namespaces};

static LIBXML2_INIT: Once = Once::new();

/// Serializes every schema compilation in the process
static SCHEMA_PARSE_LOCK: Mutex<()> = Mutex::new(());

const XML_PARSE_NONET: c_int = 1 << 11;
const XML_ERR_ERROR: c_int = 2;
const XML_CHAR_ENCODING_NONE: c_int = 0;
const XML_SCHEMATRON_OUT_ERROR: c_int = 1 << 3;

/// Error code raised for a Schematron `assert` that failed
pub const XML_SCHEMATRONV_ASSERT: i32 = 4000;
/// Error code raised for a Schematron `report` that fired
pub const XML_SCHEMATRONV_REPORT: i32 = 4001;

/// Raised when a loader refuses to fetch a network resource
const XML_IO_NETWORK_ATTEMPT: i32 = 1543;

const XPATH_NODESET: c_int = 1;
const XPATH_NUMBER: c_int = 3;
const XPATH_STRING: c_int = 4;

// Opaque libxml2 structures
#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlRelaxNg {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlRelaxNgParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlRelaxNgValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchematron {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchematronParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchematronValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlParserInputBuffer {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlXPathContext {
    _private: [u8; 0],
}

/// Layout of `xmlDtd` up to the fields read here
#[repr(C)]
pub struct XmlDtd {
    _private: *mut c_void,
    type_: c_int,
    name: *const c_char,
    children: *mut c_void,
    last: *mut c_void,
    parent: *mut c_void,
    next: *mut c_void,
    prev: *mut c_void,
    doc: *mut c_void,
    notations: *mut c_void,
    elements: *mut c_void,
    attributes: *mut c_void,
    entities: *mut c_void,
    external_id: *const c_char,
    system_id: *const c_char,
    pentities: *mut c_void,
}

#[repr(C)]
pub struct XmlNodeSet {
    node_nr: c_int,
    node_max: c_int,
    node_tab: *mut *mut c_void,
}

#[repr(C)]
pub struct XmlXPathObject {
    type_: c_int,
    nodesetval: *mut c_void,
    boolval: c_int,
    floatval: f64,
    stringval: *mut c_char,
    user: *mut c_void,
    index: c_int,
    user2: *mut c_void,
    index2: c_int,
}

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *mut xmlError)>;

pub type XmlFreeFunc = Option<unsafe extern "C" fn(mem: *mut c_void)>;

pub type XmlExternalEntityLoader = Option<
    unsafe extern "C" fn(url: *const c_char, id: *const c_char, ctxt: *mut c_void) -> *mut c_void,
>;

#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub static xmlFree: XmlFreeFunc;

    pub fn xmlInitParser();
    pub fn xmlInitGlobals();

    pub fn xmlSetStructuredErrorFunc(ctx: *mut c_void, handler: XmlStructuredErrorFunc);
    pub fn xmlSetExternalEntityLoader(loader: XmlExternalEntityLoader);
    pub fn xmlNoNetExternalEntityLoader(
        url: *const c_char,
        id: *const c_char,
        ctxt: *mut c_void,
    ) -> *mut c_void;
    pub fn xmlGetLastError() -> *const xmlError;

    // Documents
    pub fn xmlReadMemory(
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);
    pub fn xmlGetIntSubset(doc: *const XmlDoc) -> *mut XmlDtd;
    pub fn xmlHashSize(table: *mut c_void) -> c_int;
    pub fn xmlSetProp(node: *mut c_void, name: *const c_char, value: *const c_char) -> *mut c_void;

    // XPath
    pub fn xmlXPathNewContext(doc: *mut XmlDoc) -> *mut XmlXPathContext;
    pub fn xmlXPathFreeContext(ctxt: *mut XmlXPathContext);
    pub fn xmlXPathRegisterNs(
        ctxt: *mut XmlXPathContext,
        prefix: *const c_char,
        ns_uri: *const c_char,
    ) -> c_int;
    pub fn xmlXPathEvalExpression(
        expr: *const c_char,
        ctxt: *mut XmlXPathContext,
    ) -> *mut XmlXPathObject;
    pub fn xmlXPathFreeObject(obj: *mut XmlXPathObject);

    // XML Schema
    pub fn xmlSchemaNewDocParserCtxt(doc: *mut XmlDoc) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaSetParserStructuredErrors(
        ctxt: *mut XmlSchemaParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);
    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaValidateDoc(ctxt: *mut XmlSchemaValidCtxt, doc: *mut XmlDoc) -> c_int;

    // RelaxNG
    pub fn xmlRelaxNGNewDocParserCtxt(doc: *mut XmlDoc) -> *mut XmlRelaxNgParserCtxt;
    pub fn xmlRelaxNGSetParserStructuredErrors(
        ctxt: *mut XmlRelaxNgParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlRelaxNGParse(ctxt: *mut XmlRelaxNgParserCtxt) -> *mut XmlRelaxNg;
    pub fn xmlRelaxNGFreeParserCtxt(ctxt: *mut XmlRelaxNgParserCtxt);
    pub fn xmlRelaxNGFree(schema: *mut XmlRelaxNg);
    pub fn xmlRelaxNGNewValidCtxt(schema: *mut XmlRelaxNg) -> *mut XmlRelaxNgValidCtxt;
    pub fn xmlRelaxNGFreeValidCtxt(ctxt: *mut XmlRelaxNgValidCtxt);
    pub fn xmlRelaxNGSetValidStructuredErrors(
        ctxt: *mut XmlRelaxNgValidCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlRelaxNGValidateDoc(ctxt: *mut XmlRelaxNgValidCtxt, doc: *mut XmlDoc) -> c_int;

    // Schematron
    pub fn xmlSchematronNewDocParserCtxt(doc: *mut XmlDoc) -> *mut XmlSchematronParserCtxt;
    pub fn xmlSchematronParse(ctxt: *mut XmlSchematronParserCtxt) -> *mut XmlSchematron;
    pub fn xmlSchematronFreeParserCtxt(ctxt: *mut XmlSchematronParserCtxt);
    pub fn xmlSchematronFree(schema: *mut XmlSchematron);
    pub fn xmlSchematronNewValidCtxt(
        schema: *mut XmlSchematron,
        options: c_int,
    ) -> *mut XmlSchematronValidCtxt;
    pub fn xmlSchematronFreeValidCtxt(ctxt: *mut XmlSchematronValidCtxt);
    pub fn xmlSchematronSetValidStructuredErrors(
        ctxt: *mut XmlSchematronValidCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchematronValidateDoc(ctxt: *mut XmlSchematronValidCtxt, doc: *mut XmlDoc) -> c_int;

    // DTD
    pub fn xmlParserInputBufferCreateMem(
        mem: *const c_char,
        size: c_int,
        enc: c_int,
    ) -> *mut XmlParserInputBuffer;
    pub fn xmlIOParseDTD(
        sax: *mut c_void,
        input: *mut XmlParserInputBuffer,
        enc: c_int,
    ) -> *mut XmlDtd;
    pub fn xmlFreeDtd(dtd: *mut XmlDtd);
    pub fn xmlNewValidCtxt() -> *mut XmlValidCtxt;
    pub fn xmlFreeValidCtxt(ctxt: *mut XmlValidCtxt);
    pub fn xmlValidateDtd(ctxt: *mut XmlValidCtxt, doc: *mut XmlDoc, dtd: *mut XmlDtd) -> c_int;
    pub fn xmlValidateDocument(ctxt: *mut XmlValidCtxt, doc: *mut XmlDoc) -> c_int;

    // Catalogs
    pub fn xmlCatalogResolvePublic(pub_id: *const c_char) -> *mut c_char;
}

/// One error-level message reported by libxml2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// libxml2 error code
    pub code: i32,
    pub message: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
    /// Node path of the failing context (Schematron only)
    pub node_path: Option<String>,
    /// Assertion text without the path prefix (Schematron only)
    pub report: Option<String>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Diagnostic {
            code: 0,
            message: message.into(),
            line: None,
            column: None,
            node_path: None,
            report: None,
        }
    }

    unsafe fn from_raw(error: &xmlError) -> Self {
        let message = unsafe { c_string(error.message) }
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        // Schematron messages arrive as "<path> line <n>: <text>" with the path in str1
        let (node_path, report) =
            if error.code == XML_SCHEMATRONV_ASSERT || error.code == XML_SCHEMATRONV_REPORT {
                let path =
                    unsafe { c_string(error.str1) }.or_else(|| unsafe { c_string(error.str2) });
                let text = unsafe { c_string(error.str3) }
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|| strip_schematron_prefix(&message));
                (path, Some(text))
            } else {
                (None, None)
            };

        Diagnostic {
            code: error.code,
            line: u32::try_from(error.line).ok().filter(|&l| l > 0),
            column: u32::try_from(error.int2).ok().filter(|&c| c > 0),
            message,
            node_path,
            report,
        }
    }
}

fn strip_schematron_prefix(message: &str) -> String {
    message
        .split_once(": ")
        .filter(|(location, _)| location.contains(" line "))
        .map_or(message, |(_, text)| text)
        .trim()
        .to_string()
}

unsafe fn c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let c_str = unsafe { CStr::from_ptr(ptr) };
    Some(c_str.to_string_lossy().into_owned())
}

/// Collects error-level diagnostics into the `Vec<Diagnostic>` behind `user_data`
unsafe extern "C" fn structured_error_callback(user_data: *mut c_void, error: *mut xmlError) {
    if user_data.is_null() || error.is_null() {
        return;
    }
    let error = unsafe { &*error };
    if error.level < XML_ERR_ERROR {
        return;
    }
    let sink = unsafe { &mut *(user_data as *mut Vec<Diagnostic>) };
    sink.push(unsafe { Diagnostic::from_raw(error) });
}

/// Restores the thread's default error handler when dropped
struct ErrorCaptureGuard;

impl Drop for ErrorCaptureGuard {
    fn drop(&mut self) {
        unsafe {
            xmlSetStructuredErrorFunc(ptr::null_mut(), None);
        }
    }
}

/// Runs `f` with every libxml2 error raised on this thread routed into a sink.
///
/// The sink pointer is also handed to `f` so per-context handlers can share it.
fn with_captured_errors<R>(f: impl FnOnce(*mut c_void) -> R) -> (R, Vec<Diagnostic>) {
    let mut sink: Box<Vec<Diagnostic>> = Box::default();
    let sink_ptr = &mut *sink as *mut Vec<Diagnostic> as *mut c_void;

    let result = {
        unsafe {
            xmlSetStructuredErrorFunc(sink_ptr, Some(structured_error_callback));
        }
        let _guard = ErrorCaptureGuard;
        f(sink_ptr)
    };

    (result, *sink)
}

fn first_message(diagnostics: &[Diagnostic], fallback: &str) -> String {
    diagnostics
        .first()
        .map(|d| d.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// Fails a compilation that needed a network resource libxml2 refused to load
fn reject_unreachable(url: &str, diagnostics: &[Diagnostic]) -> EngineResult<()> {
    match diagnostics
        .iter()
        .find(|d| d.code == XML_IO_NETWORK_ATTEMPT)
    {
        Some(diagnostic) => Err(EngineError::UnreachableResource {
            url: url.to_string(),
            details: diagnostic.message.clone(),
        }),
        None => Ok(()),
    }
}

fn c_len(data: &[u8]) -> EngineResult<c_int> {
    c_int::try_from(data.len()).map_err(|_| EngineError::MemoryAllocation)
}

/// Owned parsed document
#[derive(Debug)]
pub struct XmlDocPtr {
    ptr: *mut XmlDoc,
    _phantom: PhantomData<XmlDoc>,
}

// Safety: a document is only ever touched by one thread at a time; shared
// access goes through a mutex in `Document`.
unsafe impl Send for XmlDocPtr {}

impl XmlDocPtr {
    unsafe fn from_raw(ptr: *mut XmlDoc) -> Option<Self> {
        if ptr.is_null() {
            return None;
        }
        Some(XmlDocPtr {
            ptr,
            _phantom: PhantomData,
        })
    }

    pub(crate) fn as_ptr(&self) -> *mut XmlDoc {
        self.ptr
    }
}

impl Drop for XmlDocPtr {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                xmlFreeDoc(self.ptr);
            }
            self.ptr = ptr::null_mut();
        }
    }
}

/// Declares an Arc-shared handle around a compiled libxml2 schema.
///
/// The schema is freed before the source document it was compiled from, since
/// some compiled forms keep pointers into that tree.
macro_rules! compiled_schema_ptr {
    ($name:ident, $inner:ident, $raw:ty, $free:ident) => {
        #[derive(Debug)]
        pub struct $name {
            inner: Arc<$inner>,
        }

        #[derive(Debug)]
        struct $inner {
            ptr: *mut $raw,
            _source: Option<XmlDocPtr>,
        }

        // Safety: compiled schemas are read-only once parsing finishes.
        unsafe impl Send for $inner {}
        unsafe impl Sync for $inner {}

        impl $name {
            fn new(ptr: *mut $raw, source: Option<XmlDocPtr>) -> Option<Self> {
                if ptr.is_null() {
                    return None;
                }
                Some($name {
                    inner: Arc::new($inner {
                        ptr,
                        _source: source,
                    }),
                })
            }

            pub(crate) fn as_ptr(&self) -> *mut $raw {
                self.inner.ptr
            }
        }

        impl Clone for $name {
            fn clone(&self) -> Self {
                $name {
                    inner: Arc::clone(&self.inner),
                }
            }
        }

        impl Drop for $inner {
            fn drop(&mut self) {
                if !self.ptr.is_null() {
                    unsafe {
                        $free(self.ptr);
                    }
                    self.ptr = ptr::null_mut();
                }
            }
        }
    };
}

compiled_schema_ptr!(XmlSchemaPtr, XmlSchemaInner, XmlSchema, xmlSchemaFree);
compiled_schema_ptr!(RelaxNgPtr, RelaxNgInner, XmlRelaxNg, xmlRelaxNGFree);
compiled_schema_ptr!(SchematronPtr, SchematronInner, XmlSchematron, xmlSchematronFree);
compiled_schema_ptr!(DtdPtr, DtdInner, XmlDtd, xmlFreeDtd);

/// Outcome of applying a compiled schema to a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Validation succeeded (return code 0)
    Valid,
    /// Validation failed with errors (return code > 0)
    Invalid {
        error_count: i32,
        errors: Vec<Diagnostic>,
    },
    /// Internal error occurred (return code < 0)
    InternalError { code: i32, errors: Vec<Diagnostic> },
}

impl ValidationResult {
    pub fn from_code(code: c_int, errors: Vec<Diagnostic>) -> Self {
        match code {
            0 => ValidationResult::Valid,
            n if n > 0 => ValidationResult::Invalid {
                error_count: n,
                errors,
            },
            n => ValidationResult::InternalError { code: n, errors },
        }
    }

    /// DTD checks report 1 for valid and 0 for invalid
    fn from_dtd_code(code: c_int, errors: Vec<Diagnostic>) -> Self {
        if code == 1 {
            ValidationResult::Valid
        } else {
            let error_count = i32::try_from(errors.len()).unwrap_or(i32::MAX).max(1);
            ValidationResult::Invalid {
                error_count,
                errors,
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ValidationResult::Invalid { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ValidationResult::InternalError { .. })
    }
}

/// Frees an XPath context when dropped
struct XPathContext(*mut XmlXPathContext);

impl Drop for XPathContext {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { xmlXPathFreeContext(self.0) }
        }
    }
}

/// Frees an XPath result when dropped
struct XPathObject(*mut XmlXPathObject);

impl Drop for XPathObject {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { xmlXPathFreeObject(self.0) }
        }
    }
}

/// Safe entry point to libxml2
pub struct LibXml2Wrapper {
    _phantom: PhantomData<()>,
}

impl LibXml2Wrapper {
    /// Create a wrapper, initializing libxml2 on first use
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
            xmlInitGlobals();
            xmlSetExternalEntityLoader(Some(xmlNoNetExternalEntityLoader));
        });

        LibXml2Wrapper {
            _phantom: PhantomData,
        }
    }

    /// Parse a document from memory.
    ///
    /// The network is never touched and the external DTD subset is not loaded.
    /// On failure the first fatal parser error is returned.
    pub fn parse_document(
        &self,
        content: &[u8],
        url: Option<&str>,
    ) -> std::result::Result<XmlDocPtr, Diagnostic> {
        let size = c_int::try_from(content.len())
            .map_err(|_| Diagnostic::new("Document too large"))?;
        let c_url = url
            .map(CString::new)
            .transpose()
            .map_err(|_| Diagnostic::new("Document location contains a NUL byte"))?;
        let url_ptr = c_url.as_ref().map_or(ptr::null(), |u| u.as_ptr());

        let (doc, diagnostics) = with_captured_errors(|_| unsafe {
            xmlReadMemory(
                content.as_ptr() as *const c_char,
                size,
                url_ptr,
                ptr::null(),
                XML_PARSE_NONET,
            )
        });

        match unsafe { XmlDocPtr::from_raw(doc) } {
            Some(doc) => Ok(doc),
            None => Err(diagnostics
                .into_iter()
                .next()
                .unwrap_or_else(|| unsafe { Self::last_error() })),
        }
    }

    unsafe fn last_error() -> Diagnostic {
        let error = unsafe { xmlGetLastError() };
        if error.is_null() {
            return Diagnostic::new("Document is not well-formed");
        }
        unsafe { Diagnostic::from_raw(&*error) }
    }

    /// Evaluate an XPath expression and return its string value.
    ///
    /// Expressions should be wrapped in `string(...)`; a numeric result is
    /// formatted, anything else yields `None`.
    pub fn xpath_string(
        &self,
        doc: &XmlDocPtr,
        expr: &str,
        namespaces: &[(&str, &str)],
    ) -> Option<String> {
        let c_expr = CString::new(expr).ok()?;
        let c_namespaces = namespaces
            .iter()
            .map(|(prefix, uri)| Some((CString::new(*prefix).ok()?, CString::new(*uri).ok()?)))
            .collect::<Option<Vec<_>>>()?;

        unsafe {
            let ctxt = XPathContext(xmlXPathNewContext(doc.as_ptr()));
            if ctxt.0.is_null() {
                return None;
            }
            for (prefix, uri) in &c_namespaces {
                xmlXPathRegisterNs(ctxt.0, prefix.as_ptr(), uri.as_ptr());
            }

            let (object, _) = with_captured_errors(|_| {
                XPathObject(xmlXPathEvalExpression(c_expr.as_ptr(), ctxt.0))
            });
            if object.0.is_null() {
                return None;
            }

            let object_ref = &*object.0;
            match object_ref.type_ {
                XPATH_STRING => c_string(object_ref.stringval).or_else(|| Some(String::new())),
                XPATH_NUMBER => Some(object_ref.floatval.to_string()),
                _ => None,
            }
        }
    }

    /// Evaluate an XPath expression that yields a number (such as `count(...)`)
    pub fn xpath_count(&self, doc: &XmlDocPtr, expr: &str) -> usize {
        self.xpath_string(doc, expr, &[])
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map_or(0, |n| n as usize)
    }

    /// Read the DOCTYPE declaration of a parsed document, if any
    pub fn internal_subset(&self, doc: &XmlDocPtr) -> Option<Doctype> {
        unsafe {
            let dtd = xmlGetIntSubset(doc.as_ptr());
            if dtd.is_null() {
                return None;
            }
            let dtd = &*dtd;
            let declares_elements = !dtd.elements.is_null() && xmlHashSize(dtd.elements) > 0;
            Some(Doctype {
                name: c_string(dtd.name).unwrap_or_default(),
                public_id: c_string(dtd.external_id),
                system_id: c_string(dtd.system_id),
                declares_elements,
            })
        }
    }

    /// Parse schema bytes into a tree, keeping `url` as its base for local includes
    fn parse_schema_document(
        &self,
        kind: ParseErrorKind,
        data: &[u8],
        url: &str,
    ) -> EngineResult<XmlDocPtr> {
        let size = c_len(data)?;
        let c_url = CString::new(url).map_err(|_| EngineError::parse(kind, "invalid schema URL"))?;

        let (doc, diagnostics) = with_captured_errors(|_| unsafe {
            xmlReadMemory(
                data.as_ptr() as *const c_char,
                size,
                c_url.as_ptr(),
                ptr::null(),
                XML_PARSE_NONET,
            )
        });

        unsafe { XmlDocPtr::from_raw(doc) }.ok_or_else(|| {
            EngineError::parse(kind, first_message(&diagnostics, "schema is not well-formed"))
        })
    }

    /// Compile an XML Schema
    pub fn compile_xsd(&self, data: &[u8], url: &str) -> EngineResult<XmlSchemaPtr> {
        let kind = ParseErrorKind::XmlSchema;
        let _lock = SCHEMA_PARSE_LOCK.lock();
        let source = self.parse_schema_document(kind, data, url)?;

        let (schema, diagnostics) = with_captured_errors(|sink| unsafe {
            let parser_ctxt = xmlSchemaNewDocParserCtxt(source.as_ptr());
            if parser_ctxt.is_null() {
                return Err(EngineError::MemoryAllocation);
            }
            xmlSchemaSetParserStructuredErrors(parser_ctxt, Some(structured_error_callback), sink);
            let schema = xmlSchemaParse(parser_ctxt);
            xmlSchemaFreeParserCtxt(parser_ctxt);
            Ok(schema)
        });

        let schema = XmlSchemaPtr::new(schema?, Some(source));
        reject_unreachable(url, &diagnostics)?;
        schema.ok_or_else(|| {
            EngineError::parse(kind, first_message(&diagnostics, "not a usable XML Schema"))
        })
    }

    /// Compile a RelaxNG grammar (XML syntax)
    pub fn compile_relaxng(&self, data: &[u8], url: &str) -> EngineResult<RelaxNgPtr> {
        let kind = ParseErrorKind::RelaxNg;
        let _lock = SCHEMA_PARSE_LOCK.lock();
        let source = self.parse_schema_document(kind, data, url)?;

        let (schema, diagnostics) = with_captured_errors(|sink| unsafe {
            let parser_ctxt = xmlRelaxNGNewDocParserCtxt(source.as_ptr());
            if parser_ctxt.is_null() {
                return Err(EngineError::MemoryAllocation);
            }
            xmlRelaxNGSetParserStructuredErrors(parser_ctxt, Some(structured_error_callback), sink);
            let schema = xmlRelaxNGParse(parser_ctxt);
            xmlRelaxNGFreeParserCtxt(parser_ctxt);
            Ok(schema)
        });

        let schema = RelaxNgPtr::new(schema?, Some(source));
        reject_unreachable(url, &diagnostics)?;
        schema.ok_or_else(|| {
            EngineError::parse(kind, first_message(&diagnostics, "not a usable RelaxNG grammar"))
        })
    }

    /// Compile a Schematron schema (ISO or pre-ISO namespace)
    pub fn compile_schematron(&self, data: &[u8], url: &str) -> EngineResult<SchematronPtr> {
        let kind = ParseErrorKind::Schematron;
        let _lock = SCHEMA_PARSE_LOCK.lock();
        let source = self.parse_schema_document(kind, data, url)?;
        self.name_unnamed_patterns(&source);

        let (schema, diagnostics) = with_captured_errors(|_| unsafe {
            let parser_ctxt = xmlSchematronNewDocParserCtxt(source.as_ptr());
            if parser_ctxt.is_null() {
                return Err(EngineError::MemoryAllocation);
            }
            let schema = xmlSchematronParse(parser_ctxt);
            xmlSchematronFreeParserCtxt(parser_ctxt);
            Ok(schema)
        });

        let schema = SchematronPtr::new(schema?, Some(source));
        reject_unreachable(url, &diagnostics)?;
        schema.ok_or_else(|| {
            EngineError::parse(kind, first_message(&diagnostics, "not a usable Schematron schema"))
        })
    }

    /// Give every Schematron `pattern` lacking both `id` and `name` a generated name.
    ///
    /// libxml2 compiles anonymous patterns but fails every validation against
    /// them with an internal error.
    fn name_unnamed_patterns(&self, source: &XmlDocPtr) {
        let expr = format!(
            "//*[local-name()='pattern' and (namespace-uri()='{}' or namespace-uri()='{}')]\
             [not(@id) and not(@name)]",
            namespaces::ISO_SCHEMATRON,
            namespaces::PRE_ISO_SCHEMATRON,
        );
        let Ok(c_expr) = CString::new(expr) else {
            return;
        };

        unsafe {
            let ctxt = XPathContext(xmlXPathNewContext(source.as_ptr()));
            if ctxt.0.is_null() {
                return;
            }
            let (object, _) = with_captured_errors(|_| {
                XPathObject(xmlXPathEvalExpression(c_expr.as_ptr(), ctxt.0))
            });
            if object.0.is_null() || (*object.0).type_ != XPATH_NODESET {
                return;
            }
            let set = (*object.0).nodesetval as *const XmlNodeSet;
            if set.is_null() || (*set).node_tab.is_null() {
                return;
            }

            let count = usize::try_from((*set).node_nr).unwrap_or(0);
            for i in 0..count {
                let node = *(*set).node_tab.add(i);
                if let Ok(name) = CString::new(format!("pattern-{}", i + 1)) {
                    xmlSetProp(node, c"name".as_ptr(), name.as_ptr());
                }
            }
        }
    }

    /// Compile an external DTD subset
    pub fn compile_dtd(&self, data: &[u8]) -> EngineResult<DtdPtr> {
        let kind = ParseErrorKind::Dtd;
        let size = c_len(data)?;
        let _lock = SCHEMA_PARSE_LOCK.lock();

        let (dtd, diagnostics) = with_captured_errors(|_| unsafe {
            let input = xmlParserInputBufferCreateMem(
                data.as_ptr() as *const c_char,
                size,
                XML_CHAR_ENCODING_NONE,
            );
            if input.is_null() {
                return Err(EngineError::MemoryAllocation);
            }
            // xmlIOParseDTD takes ownership of the input buffer
            Ok(xmlIOParseDTD(ptr::null_mut(), input, XML_CHAR_ENCODING_NONE))
        });

        DtdPtr::new(dtd?, None).ok_or_else(|| {
            EngineError::parse(kind, first_message(&diagnostics, "not a usable DTD"))
        })
    }

    pub fn validate_xsd(
        &self,
        schema: &XmlSchemaPtr,
        doc: &XmlDocPtr,
    ) -> EngineResult<ValidationResult> {
        let (code, errors) = with_captured_errors(|sink| unsafe {
            let valid_ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
            if valid_ctxt.is_null() {
                return Err(EngineError::ValidationContextCreationFailed);
            }
            xmlSchemaSetValidStructuredErrors(valid_ctxt, Some(structured_error_callback), sink);
            let code = xmlSchemaValidateDoc(valid_ctxt, doc.as_ptr());
            xmlSchemaFreeValidCtxt(valid_ctxt);
            Ok(code)
        });
        Ok(ValidationResult::from_code(code?, errors))
    }

    pub fn validate_relaxng(
        &self,
        schema: &RelaxNgPtr,
        doc: &XmlDocPtr,
    ) -> EngineResult<ValidationResult> {
        let (code, errors) = with_captured_errors(|sink| unsafe {
            let valid_ctxt = xmlRelaxNGNewValidCtxt(schema.as_ptr());
            if valid_ctxt.is_null() {
                return Err(EngineError::ValidationContextCreationFailed);
            }
            xmlRelaxNGSetValidStructuredErrors(valid_ctxt, Some(structured_error_callback), sink);
            let code = xmlRelaxNGValidateDoc(valid_ctxt, doc.as_ptr());
            xmlRelaxNGFreeValidCtxt(valid_ctxt);
            Ok(code)
        });
        Ok(ValidationResult::from_code(code?, errors))
    }

    /// Apply a Schematron schema; each failed assertion becomes one diagnostic
    pub fn validate_schematron(
        &self,
        schema: &SchematronPtr,
        doc: &XmlDocPtr,
    ) -> EngineResult<ValidationResult> {
        let (code, errors) = with_captured_errors(|sink| unsafe {
            let valid_ctxt = xmlSchematronNewValidCtxt(schema.as_ptr(), XML_SCHEMATRON_OUT_ERROR);
            if valid_ctxt.is_null() {
                return Err(EngineError::ValidationContextCreationFailed);
            }
            xmlSchematronSetValidStructuredErrors(
                valid_ctxt,
                Some(structured_error_callback),
                sink,
            );
            let code = xmlSchematronValidateDoc(valid_ctxt, doc.as_ptr());
            xmlSchematronFreeValidCtxt(valid_ctxt);
            Ok(code)
        });
        Ok(ValidationResult::from_code(code?, errors))
    }

    /// Validate against an external DTD compiled with [`Self::compile_dtd`]
    pub fn validate_dtd(&self, dtd: &DtdPtr, doc: &XmlDocPtr) -> EngineResult<ValidationResult> {
        let (code, errors) = with_captured_errors(|_| unsafe {
            let valid_ctxt = xmlNewValidCtxt();
            if valid_ctxt.is_null() {
                return Err(EngineError::ValidationContextCreationFailed);
            }
            let code = xmlValidateDtd(valid_ctxt, doc.as_ptr(), dtd.as_ptr());
            xmlFreeValidCtxt(valid_ctxt);
            Ok(code)
        });
        Ok(ValidationResult::from_dtd_code(code?, errors))
    }

    /// Validate against the document's own internal subset
    pub fn validate_internal_subset(&self, doc: &XmlDocPtr) -> EngineResult<ValidationResult> {
        let (code, errors) = with_captured_errors(|_| unsafe {
            let valid_ctxt = xmlNewValidCtxt();
            if valid_ctxt.is_null() {
                return Err(EngineError::ValidationContextCreationFailed);
            }
            let code = xmlValidateDocument(valid_ctxt, doc.as_ptr());
            xmlFreeValidCtxt(valid_ctxt);
            Ok(code)
        });
        Ok(ValidationResult::from_dtd_code(code?, errors))
    }

    /// Look up a public identifier in the XML catalogs named by `XML_CATALOG_FILES`
    pub fn resolve_public(&self, public_id: &str) -> Option<String> {
        let c_public = CString::new(public_id).ok()?;
        unsafe {
            let (resolved, _) =
                with_captured_errors(|_| xmlCatalogResolvePublic(c_public.as_ptr()));
            if resolved.is_null() {
                return None;
            }
            let uri = c_string(resolved);
            if let Some(free) = xmlFree {
                free(resolved as *mut c_void);
            }
            uri
        }
    }
}

impl Default for LibXml2Wrapper {
    fn default() -> Self {
        Self::new()
    }
}
