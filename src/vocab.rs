//! Controlled vocabulary for emitted statements.
//!
//! Classes and properties are closed enums mapped to IRIs by `match`, with a
//! `Custom` escape hatch for plugins. Nothing here is cached at runtime.

use serde::Serialize;
use std::fmt;

/// Namespace prefixes used by the vocabulary.
pub mod ns {
    /// NEPOMUK file ontology.
    pub const NFO: &str = "http://www.semanticdesktop.org/ontologies/2007/03/22/nfo#";
    /// NEPOMUK information element.
    pub const NIE: &str = "http://www.semanticdesktop.org/ontologies/2007/01/19/nie#";
    /// DCMI terms.
    pub const DCTERMS: &str = "http://purl.org/dc/terms/";
    /// RDF schema.
    pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
    /// XML schema datatypes.
    pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
    /// Terms specific to this crate.
    pub const FS: &str = "https://formscope.dev/ns#";
}

/// Node classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Class {
    /// A file's content.
    FileDataObject,
    /// A directory, real or implied by archive paths.
    Folder,
    /// Entry owned by an archive.
    ArchiveItem,
    /// Content embedded in another file, such as a decompressed payload.
    EmbeddedFileDataObject,
    /// A container of entries.
    Archive,
    /// Text in a known encoding.
    PlainTextDocument,
    /// An executable image.
    Executable,
    /// A digest of a file's content.
    FileHash,
    /// Any value not yet classified more specifically.
    DataObject,
    /// Class given by full IRI.
    Custom(&'static str),
}

impl Class {
    /// Full IRI of the class.
    pub fn iri(&self) -> String {
        match self {
            Class::FileDataObject => format!("{}FileDataObject", ns::NFO),
            Class::Folder => format!("{}Folder", ns::NFO),
            Class::ArchiveItem => format!("{}ArchiveItem", ns::NFO),
            Class::EmbeddedFileDataObject => format!("{}EmbeddedFileDataObject", ns::NFO),
            Class::Archive => format!("{}Archive", ns::NFO),
            Class::PlainTextDocument => format!("{}PlainTextDocument", ns::NFO),
            Class::Executable => format!("{}Executable", ns::NFO),
            Class::FileHash => format!("{}FileHash", ns::NFO),
            Class::DataObject => format!("{}DataObject", ns::NIE),
            Class::Custom(iri) => (*iri).to_string(),
        }
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.iri())
    }
}

/// Properties linking a node to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    /// Display label.
    Label,
    /// Entry or file name.
    FileName,
    /// Content length in bytes.
    FileSize,
    /// Creation time.
    FileCreated,
    /// Last write time.
    FileLastModified,
    /// Last access time.
    FileLastAccessed,
    /// Containing folder or archive.
    BelongsToContainer,
    /// Encryption status individual.
    EncryptionStatus,
    /// Version within a versioned store.
    Revision,
    /// Media type of the content.
    MediaType,
    /// Usual file extension of the format.
    Extension,
    /// Package description text.
    Description,
    /// Text encoding.
    Encoding,
    /// Text line count.
    LineCount,
    /// Text character count.
    CharacterCount,
    /// Digest algorithm name.
    HashAlgorithm,
    /// Digest value.
    HashValue,
    /// Link to a digest node.
    HasHash,
    /// Inline content as a data URI.
    Content,
    /// Node describing the decoded value.
    InterpretedAs,
    /// Recognizer that matched the content.
    RecognizedBy,
    /// Analyzer that described the node.
    AnalyzedBy,
    /// Content matched no registered format.
    NoFormat,
    /// Non-fatal analysis error.
    Diagnostic,
    /// Executable architecture.
    Architecture,
    /// Executable address width.
    Bitwidth,
    /// Executable byte order.
    Endianness,
    /// Property given by full IRI.
    Custom(&'static str),
}

impl Property {
    /// Full IRI of the property.
    pub fn iri(&self) -> String {
        match self {
            Property::Label => format!("{}label", ns::RDFS),
            Property::FileName => format!("{}fileName", ns::NFO),
            Property::FileSize => format!("{}fileSize", ns::NFO),
            Property::FileCreated => format!("{}fileCreated", ns::NFO),
            Property::FileLastModified => format!("{}fileLastModified", ns::NFO),
            Property::FileLastAccessed => format!("{}fileLastAccessed", ns::NFO),
            Property::BelongsToContainer => format!("{}belongsToContainer", ns::NFO),
            Property::EncryptionStatus => format!("{}encryptionStatus", ns::NFO),
            Property::Revision => format!("{}revision", ns::FS),
            Property::MediaType => format!("{}format", ns::DCTERMS),
            Property::Extension => format!("{}extension", ns::FS),
            Property::Description => format!("{}description", ns::DCTERMS),
            Property::Encoding => format!("{}encoding", ns::NFO),
            Property::LineCount => format!("{}lineCount", ns::NFO),
            Property::CharacterCount => format!("{}characterCount", ns::NFO),
            Property::HashAlgorithm => format!("{}hashAlgorithm", ns::NFO),
            Property::HashValue => format!("{}hashValue", ns::NFO),
            Property::HasHash => format!("{}hasHash", ns::NFO),
            Property::Content => format!("{}content", ns::FS),
            Property::InterpretedAs => format!("{}interpretedAs", ns::NIE),
            Property::RecognizedBy => format!("{}recognizedBy", ns::FS),
            Property::AnalyzedBy => format!("{}analyzedBy", ns::FS),
            Property::NoFormat => format!("{}noFormat", ns::FS),
            Property::Diagnostic => format!("{}diagnostic", ns::FS),
            Property::Architecture => format!("{}architecture", ns::FS),
            Property::Bitwidth => format!("{}bitwidth", ns::FS),
            Property::Endianness => format!("{}endianness", ns::FS),
            Property::Custom(iri) => (*iri).to_string(),
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.iri())
    }
}

/// Individuals of `nfo:EncryptionStatus`.
pub mod encryption {
    /// Content is encrypted.
    pub const ENCRYPTED: &str = "http://www.semanticdesktop.org/ontologies/2007/03/22/nfo#encryptedStatus";
    /// Content is not encrypted.
    pub const DECRYPTED: &str = "http://www.semanticdesktop.org/ontologies/2007/03/22/nfo#decryptedStatus";
}
