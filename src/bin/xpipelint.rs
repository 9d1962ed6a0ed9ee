//! Parse XML files through the component pipeline and report their diagnostics.

use std::{cell::RefCell, fs, process::exit, rc::Rc};

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};
use xpipe::{
    NonValidatingConfiguration, Xml11Configuration, XmlParserConfiguration,
    XmlPullParserConfiguration,
    constants::{CONTINUE_AFTER_FATAL_ERROR, NAMESPACES, VALIDATION},
    dtd::XmlAttributeDecl,
    error::{XmlErrorCode, XmlErrorDomain, XmlParseError, XniError},
    reporter::DefaultErrorHandler,
    xni::{
        Augmentations, QName, XmlAttributes, XmlDocumentHandler, XmlDtdHandler, XmlErrorHandler,
        XmlInputSource, XmlLocation,
    },
};

// Error codes.
// These follow the return codes of `xmllint`.
const RETURN_OK: i32 = 0; // No error
const ERR_UNCLASS: i32 = 1; // Unclassified
const ERR_DTD: i32 = 2; // Error in DTD
const ERR_VALID: i32 = 3; // Validation error
const ERR_RDFILE: i32 = 4; // File read error

#[derive(clap::Parser, Debug)]
#[command(
    version,
    name = "xpipelint",
    about = "Parse the XML files through the XML 1.0/1.1 component pipeline.",
    arg_required_else_help = true
)]
struct CmdArgs {
    #[clap(required = true)]
    xml_files: Vec<String>,
    /// do not bind element and attribute names to namespaces
    #[arg(long = "no-namespaces")]
    no_namespaces: bool,
    /// validate the document against its DTD
    #[arg(long)]
    valid: bool,
    /// keep scanning after a fatal error
    #[arg(long = "continue-after-fatal")]
    continue_after_fatal: bool,
    /// use the scan-only configuration without DTD processing or version detection
    #[arg(long)]
    nonvalidating: bool,
    /// print the events delivered to the handlers
    #[arg(long)]
    events: bool,
    /// pull the document one markup construct at a time
    #[arg(long)]
    incremental: bool,
    /// log pipeline decisions
    #[arg(short, long)]
    verbose: bool,
}

/// Prints diagnostics and remembers the worst return code they imply.
#[derive(Default)]
struct Diagnostics {
    status: i32,
}

impl Diagnostics {
    fn record(&mut self, error: &XmlParseError) {
        let status = match error.domain() {
            XmlErrorDomain::Validity => ERR_VALID,
            _ if is_dtd_error(error.code) => ERR_DTD,
            _ => ERR_UNCLASS,
        };
        self.status = self.status.max(status);
    }
}

impl XmlErrorHandler for Diagnostics {
    fn warning(&mut self, error: &XmlParseError) -> Result<(), XniError> {
        DefaultErrorHandler.warning(error)
    }

    fn error(&mut self, error: &XmlParseError) -> Result<(), XniError> {
        self.record(error);
        DefaultErrorHandler.error(error)
    }

    fn fatal_error(&mut self, error: &XmlParseError) -> Result<(), XniError> {
        self.record(error);
        DefaultErrorHandler.fatal_error(error)
    }
}

fn is_dtd_error(code: XmlErrorCode) -> bool {
    use XmlErrorCode::*;
    matches!(
        code,
        MarkupNotRecognizedInDtd
            | PEReferenceWithinMarkup
            | ElementDeclUnterminated
            | ContentModelInvalid
            | AttlistDeclUnterminated
            | AttTypeRequired
            | AttDefaultRequired
            | EntityDeclUnterminated
            | NotationDeclUnterminated
            | ExternalIdRequired
            | CondSectUnterminated
            | CondSectInInternalSubset
    )
}

/// Prints every event it receives, one per line.
struct EventPrinter;

impl XmlDocumentHandler for EventPrinter {
    fn start_document(
        &mut self,
        location: &XmlLocation,
        encoding: Option<&str>,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        println!("startDocument({location}, {encoding:?})");
        Ok(())
    }

    fn xml_decl(
        &mut self,
        version: &str,
        encoding: Option<&str>,
        standalone: Option<bool>,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        println!("xmlDecl({version}, {encoding:?}, {standalone:?})");
        Ok(())
    }

    fn doctype_decl(
        &mut self,
        root_element: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        println!("doctypeDecl({root_element}, {public_id:?}, {system_id:?})");
        Ok(())
    }

    fn comment(&mut self, text: &str, _augs: &Augmentations) -> Result<(), XniError> {
        println!("comment({text:?})");
        Ok(())
    }

    fn processing_instruction(
        &mut self,
        target: &str,
        data: Option<&str>,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        println!("processingInstruction({target}, {data:?})");
        Ok(())
    }

    fn start_element(
        &mut self,
        element: &QName,
        attributes: &XmlAttributes,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        println!("startElement({element}{})", format_attributes(attributes));
        Ok(())
    }

    fn empty_element(
        &mut self,
        element: &QName,
        attributes: &XmlAttributes,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        println!("emptyElement({element}{})", format_attributes(attributes));
        Ok(())
    }

    fn characters(&mut self, text: &str, _augs: &Augmentations) -> Result<(), XniError> {
        println!("characters({text:?})");
        Ok(())
    }

    fn ignorable_whitespace(&mut self, text: &str, _augs: &Augmentations) -> Result<(), XniError> {
        println!("ignorableWhitespace({text:?})");
        Ok(())
    }

    fn end_element(&mut self, element: &QName, _augs: &Augmentations) -> Result<(), XniError> {
        println!("endElement({element})");
        Ok(())
    }

    fn start_cdata(&mut self, _augs: &Augmentations) -> Result<(), XniError> {
        println!("startCDATA()");
        Ok(())
    }

    fn end_cdata(&mut self, _augs: &Augmentations) -> Result<(), XniError> {
        println!("endCDATA()");
        Ok(())
    }

    fn end_document(&mut self, _augs: &Augmentations) -> Result<(), XniError> {
        println!("endDocument()");
        Ok(())
    }
}

impl XmlDtdHandler for EventPrinter {
    fn start_dtd(&mut self, _location: &XmlLocation, _augs: &Augmentations) -> Result<(), XniError> {
        println!("startDTD()");
        Ok(())
    }

    fn element_decl(
        &mut self,
        name: &str,
        content_model: &str,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        println!("elementDecl({name}, {content_model})");
        Ok(())
    }

    fn attribute_decl(
        &mut self,
        decl: &XmlAttributeDecl,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        println!(
            "attributeDecl({}, {}, {})",
            decl.element_name, decl.attribute_name, decl.att_type
        );
        Ok(())
    }

    fn internal_entity_decl(
        &mut self,
        name: &str,
        text: &str,
        _augs: &Augmentations,
    ) -> Result<(), XniError> {
        println!("internalEntityDecl({name}, {text:?})");
        Ok(())
    }

    fn end_dtd(&mut self, _augs: &Augmentations) -> Result<(), XniError> {
        println!("endDTD()");
        Ok(())
    }
}

fn format_attributes(attributes: &XmlAttributes) -> String {
    attributes
        .iter()
        .map(|att| format!(", {}={:?}", att.name, att.value))
        .collect()
}

fn build_configuration(args: &CmdArgs) -> anyhow::Result<Box<dyn XmlPullParserConfiguration>> {
    let mut config: Box<dyn XmlPullParserConfiguration> = if args.nonvalidating {
        Box::new(NonValidatingConfiguration::new())
    } else {
        Box::new(Xml11Configuration::new())
    };
    config
        .set_feature(NAMESPACES, !args.no_namespaces)
        .context("failed to configure namespace processing")?;
    config
        .set_feature(CONTINUE_AFTER_FATAL_ERROR, args.continue_after_fatal)
        .context("failed to configure fatal error recovery")?;
    if args.valid {
        anyhow::ensure!(
            !args.nonvalidating,
            "--valid cannot be combined with --nonvalidating"
        );
        config
            .set_feature(VALIDATION, true)
            .context("failed to enable validation")?;
    }
    if args.events {
        // Each slot is borrowed for the whole parse.
        config.set_document_handler(Some(Rc::new(RefCell::new(EventPrinter))));
        config.set_dtd_handler(Some(Rc::new(RefCell::new(EventPrinter))));
    }
    Ok(config)
}

fn lint_file(
    config: &mut dyn XmlPullParserConfiguration,
    diagnostics: &Rc<RefCell<Diagnostics>>,
    incremental: bool,
    file: &str,
) -> i32 {
    let bytes = match fs::read(file) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("{file}: failed to read: {e}");
            return ERR_RDFILE;
        }
    };
    diagnostics.borrow_mut().status = RETURN_OK;
    let source = XmlInputSource::from_bytes(bytes).with_system_id(file);

    let result = if incremental {
        config.set_input_source(source);
        let mut steps = 0usize;
        let result = loop {
            match config.parse_step(false) {
                Ok(true) => steps += 1,
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        config.cleanup();
        debug!(file, steps, "incremental parse finished");
        result
    } else {
        config.parse(source)
    };

    let reported = diagnostics.borrow().status;
    match result {
        Ok(()) => reported,
        // Already delivered to the error handler.
        Err(XniError::Parse(_)) => reported.max(ERR_UNCLASS),
        Err(XniError::Io(e)) => {
            eprintln!("{file}: {e}");
            ERR_RDFILE
        }
        Err(e) => {
            eprintln!("{file}: {e}");
            reported.max(ERR_UNCLASS)
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = CmdArgs::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let mut config = build_configuration(&args)?;
    let diagnostics = Rc::new(RefCell::new(Diagnostics::default()));
    config
        .set_error_handler(diagnostics.clone())
        .context("failed to install the error handler")?;

    let mut status = RETURN_OK;
    for file in &args.xml_files {
        let code = lint_file(config.as_mut(), &diagnostics, args.incremental, file);
        info!(file, code, "parsed");
        status = status.max(code);
    }
    if status != RETURN_OK {
        exit(status);
    }
    Ok(())
}
