//! Structures de l'enveloppe SOAP

use xmltree::{Element, XMLNode};

/// Enveloppe SOAP complète
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    /// En-tête SOAP optionnel
    pub header: Option<SoapHeader>,

    /// Corps SOAP contenant l'action ou la réponse
    pub body: SoapBody,
}

/// En-tête SOAP
#[derive(Debug, Clone)]
pub struct SoapHeader {
    /// Contenu XML brut de l'en-tête
    pub content: Element,
}

/// Corps SOAP
#[derive(Debug, Clone)]
pub struct SoapBody {
    /// Contenu XML brut du corps
    pub content: Element,
}

impl SoapEnvelope {
    /// Crée une nouvelle enveloppe SOAP
    pub fn new(body: SoapBody) -> Self {
        Self { header: None, body }
    }
}

impl SoapBody {
    /// Premier enfant direct du corps dont le nom se termine par `suffix`
    /// (les préfixes de namespace varient d'un device à l'autre).
    pub fn child_with_suffix(&self, suffix: &str) -> Option<&Element> {
        child_with_suffix(&self.content, suffix)
    }
}

/// Premier enfant élément de `parent` dont le nom se termine par `suffix`.
pub fn child_with_suffix<'a>(parent: &'a Element, suffix: &str) -> Option<&'a Element> {
    parent.children.iter().find_map(|node| match node {
        XMLNode::Element(elem) if elem.name.ends_with(suffix) => Some(elem),
        _ => None,
    })
}
