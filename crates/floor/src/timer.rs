//! Timer eines Kanals
//!
//! Pro Art hoechstens ein laufender Timer. Jeder Timer ist ein eigener
//! tokio-Task; ein Neustart bricht den Vorgaenger ab. Jeder Start erhoeht
//! die Generation, damit ein Ausloeser, der sich mit einem Abbruch
//! ueberschnitten hat, erkannt und ignoriert wird.

use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Art eines Kanal-Timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerArt {
    /// Warten auf Antwort auf die eigene Anfrage
    Anfrage,
    /// Ende der eigenen Sprechzeit
    Erteilung,
    /// Naechster eigener Heartbeat
    Heartbeat,
    /// Letzter Heartbeat des fremden Sprechers zu lange her
    HalterWacht,
}

impl TimerArt {
    pub const ALLE: [TimerArt; 4] = [
        TimerArt::Anfrage,
        TimerArt::Erteilung,
        TimerArt::Heartbeat,
        TimerArt::HalterWacht,
    ];
}

#[derive(Debug)]
struct LaufenderTimer {
    generation: u64,
    task: JoinHandle<()>,
}

/// Die laufenden Timer eines Kanals
#[derive(Debug, Default)]
pub struct TimerSet {
    laufend: HashMap<TimerArt, LaufenderTimer>,
    generation: u64,
}

impl TimerSet {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Startet (oder ersetzt) den Timer `art`
    ///
    /// `ausloeser` bekommt die Generation des Starts und muss sie vor dem
    /// Ausfuehren mit `ist_aktuell` pruefen. Ohne laufende tokio-Runtime
    /// wird kein Timer gestartet.
    pub fn starten<F>(&mut self, art: TimerArt, dauer: Duration, ausloeser: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.stoppen(art);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(?art, "Keine tokio-Runtime, Timer nicht gestartet");
            return;
        };

        self.generation += 1;
        let generation = self.generation;
        let task = runtime.spawn(async move {
            tokio::time::sleep(dauer).await;
            ausloeser(generation);
        });
        self.laufend.insert(art, LaufenderTimer { generation, task });
    }

    pub fn stoppen(&mut self, art: TimerArt) {
        if let Some(timer) = self.laufend.remove(&art) {
            timer.task.abort();
        }
    }

    pub fn alle_stoppen(&mut self) {
        for (_, timer) in self.laufend.drain() {
            timer.task.abort();
        }
    }

    /// Prueft ob `generation` der aktuelle Start von `art` ist
    pub fn ist_aktuell(&self, art: TimerArt, generation: u64) -> bool {
        self.laufend
            .get(&art)
            .is_some_and(|t| t.generation == generation)
    }

    /// Meldet einen Timer als abgelaufen, wenn die Generation passt
    pub fn abgelaufen(&mut self, art: TimerArt, generation: u64) -> bool {
        if self.ist_aktuell(art, generation) {
            self.laufend.remove(&art);
            true
        } else {
            false
        }
    }

    pub fn laeuft(&self, art: TimerArt) -> bool {
        self.laufend.contains_key(&art)
    }

    pub fn anzahl(&self) -> usize {
        self.laufend.len()
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.alle_stoppen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn timer_feuert_nach_ablauf() {
        let gefeuert = Arc::new(Mutex::new(Vec::new()));
        let mut timer = TimerSet::neu();

        let ziel = Arc::clone(&gefeuert);
        timer.starten(TimerArt::Anfrage, Duration::from_millis(2000), move |gen| {
            ziel.lock().push(gen);
        });
        assert!(timer.laeuft(TimerArt::Anfrage));

        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert!(gefeuert.lock().is_empty());
        tokio::time::sleep(Duration::from_millis(2)).await;

        let generation = gefeuert.lock()[0];
        assert!(timer.abgelaufen(TimerArt::Anfrage, generation));
        assert!(!timer.laeuft(TimerArt::Anfrage));
    }

    #[tokio::test(start_paused = true)]
    async fn neustart_bricht_vorgaenger_ab() {
        let gefeuert = Arc::new(Mutex::new(Vec::new()));
        let mut timer = TimerSet::neu();

        for _ in 0..2 {
            let ziel = Arc::clone(&gefeuert);
            timer.starten(TimerArt::Heartbeat, Duration::from_millis(100), move |gen| {
                ziel.lock().push(gen);
            });
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        let gens = gefeuert.lock().clone();
        assert_eq!(gens.len(), 1);
        assert!(timer.ist_aktuell(TimerArt::Heartbeat, gens[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn veraltete_generation_wird_ignoriert() {
        let mut timer = TimerSet::neu();
        timer.starten(TimerArt::Erteilung, Duration::from_millis(10), |_| {});
        timer.starten(TimerArt::Erteilung, Duration::from_millis(10), |_| {});
        // Generation 1 gehoert zum abgebrochenen Start
        assert!(!timer.abgelaufen(TimerArt::Erteilung, 1));
        assert!(timer.abgelaufen(TimerArt::Erteilung, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn alle_stoppen() {
        let gefeuert = Arc::new(Mutex::new(0u32));
        let mut timer = TimerSet::neu();
        for art in TimerArt::ALLE {
            let ziel = Arc::clone(&gefeuert);
            timer.starten(art, Duration::from_millis(10), move |_| *ziel.lock() += 1);
        }
        assert_eq!(timer.anzahl(), 4);
        timer.alle_stoppen();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*gefeuert.lock(), 0);
        assert_eq!(timer.anzahl(), 0);
    }

    #[test]
    fn ohne_runtime_kein_timer() {
        let mut timer = TimerSet::neu();
        timer.starten(TimerArt::Anfrage, Duration::from_millis(10), |_| {});
        assert!(!timer.laeuft(TimerArt::Anfrage));
    }
}
