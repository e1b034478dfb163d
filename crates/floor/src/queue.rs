//! Warteschlange der Floor-Anfragen eines Kanals
//!
//! Geordnete Map ueber den Sortierschluessel der Gesamtordnung plus ein
//! Index `request_id -> Schluessel` fuer Entfernen und Positionsabfrage.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

use crate::request::{FloorRequest, OrdnungsSchluessel};

/// Standard-Kapazitaet einer Kanal-Queue
pub const MAX_QUEUE_SIZE: usize = 10;

/// Warum eine Anfrage nicht eingereiht wurde
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EinreihFehler {
    Voll,
    Doppelt,
}

#[derive(Debug, Clone)]
struct Eintrag {
    anfrage: FloorRequest,
    eingereiht: Instant,
}

/// Prioritaets-Queue mit fester Kapazitaet
#[derive(Debug, Clone)]
pub struct RequestQueue {
    eintraege: BTreeMap<OrdnungsSchluessel, Eintrag>,
    index: HashMap<String, OrdnungsSchluessel>,
    kapazitaet: usize,
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::neu(MAX_QUEUE_SIZE)
    }
}

impl RequestQueue {
    pub fn neu(kapazitaet: usize) -> Self {
        Self {
            eintraege: BTreeMap::new(),
            index: HashMap::new(),
            kapazitaet,
        }
    }

    /// Reiht eine Anfrage ein und gibt ihre Position (1-basiert) zurueck
    pub fn einfuegen(&mut self, anfrage: FloorRequest) -> Result<usize, EinreihFehler> {
        if self.index.contains_key(&anfrage.request_id) {
            return Err(EinreihFehler::Doppelt);
        }
        if self.ist_voll() {
            return Err(EinreihFehler::Voll);
        }
        let schluessel = anfrage.ordnungs_schluessel();
        let id = anfrage.request_id.clone();
        self.eintraege.insert(
            schluessel.clone(),
            Eintrag {
                anfrage,
                eingereiht: Instant::now(),
            },
        );
        self.index.insert(id.clone(), schluessel);
        Ok(self.position(&id).unwrap_or(self.len()))
    }

    pub fn entfernen(&mut self, request_id: &str) -> Option<FloorRequest> {
        let schluessel = self.index.remove(request_id)?;
        self.eintraege.remove(&schluessel).map(|e| e.anfrage)
    }

    /// Entnimmt die am hoechsten geordnete Anfrage
    pub fn naechste(&mut self) -> Option<FloorRequest> {
        let (_, eintrag) = self.eintraege.pop_first()?;
        self.index.remove(&eintrag.anfrage.request_id);
        Some(eintrag.anfrage)
    }

    /// Position (1-basiert) einer Anfrage
    pub fn position(&self, request_id: &str) -> Option<usize> {
        let schluessel = self.index.get(request_id)?;
        Some(self.eintraege.range(..schluessel).count() + 1)
    }

    pub fn enthaelt(&self, request_id: &str) -> bool {
        self.index.contains_key(request_id)
    }

    /// Anfragen in Reihenfolge der Gesamtordnung
    pub fn iter(&self) -> impl Iterator<Item = &FloorRequest> {
        self.eintraege.values().map(|e| &e.anfrage)
    }

    pub fn len(&self) -> usize {
        self.eintraege.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eintraege.is_empty()
    }

    pub fn ist_voll(&self) -> bool {
        self.eintraege.len() >= self.kapazitaet
    }

    pub fn kapazitaet(&self) -> usize {
        self.kapazitaet
    }

    pub fn leeren(&mut self) {
        self.eintraege.clear();
        self.index.clear();
    }

    /// Entfernt Eintraege die laenger als `max_wartezeit` warten
    pub fn aelter_als_entfernen(&mut self, max_wartezeit: Duration) -> Vec<FloorRequest> {
        let jetzt = Instant::now();
        let abgelaufen: Vec<String> = self
            .eintraege
            .values()
            .filter(|e| jetzt.duration_since(e.eingereiht) > max_wartezeit)
            .map(|e| e.anfrage.request_id.clone())
            .collect();
        abgelaufen
            .iter()
            .filter_map(|id| self.entfernen(id))
            .collect()
    }
}
