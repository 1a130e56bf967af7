pub mod certificate;
pub mod dns;

pub use certificate::CertificateCommand;
pub use dns::DnsCommand;
