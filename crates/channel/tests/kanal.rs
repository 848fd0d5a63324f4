//! Integrationstests fuer Channel-Manager und sichere Sitzung ueber echte
//! TCP-Verbindungen auf 127.0.0.1

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use securechat_channel::{
    AeadAlgorithmus, ChannelManager, Ereignisempfaenger, KanalConfig, KanalError, KanalEreignis,
    NachrichtenTyp, Richtung, SichereSitzung, SitzungsEreignis, VerbindungsId,
    VerbindungsZustand,
};
use securechat_crypto::{schluessel_ableiten, seal, Sitzungsschluessel};
use securechat_observability::VerwerfGrund;
use securechat_protocol::{encode, FrameCodec};

const ZEITLIMIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Hilfsfunktionen
// ---------------------------------------------------------------------------

fn logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("securechat_channel=debug")
        .with_test_writer()
        .try_init();
}

fn test_config() -> KanalConfig {
    KanalConfig {
        bind_adresse: "127.0.0.1".into(),
        port: 0,
        ..Default::default()
    }
}

fn test_schluessel() -> Sitzungsschluessel {
    schluessel_ableiten(&"00".repeat(32)).unwrap()
}

async fn naechstes(rx: &mut Ereignisempfaenger) -> KanalEreignis {
    tokio::time::timeout(ZEITLIMIT, rx.recv())
        .await
        .expect("Zeitlimit beim Warten auf Ereignis")
        .expect("Ereigniskanal geschlossen")
}

async fn warte_auf_verbunden(rx: &mut Ereignisempfaenger) -> (VerbindungsId, Option<SocketAddr>) {
    loop {
        if let KanalEreignis::Verbunden { id, peer, .. } = naechstes(rx).await {
            return (id, peer);
        }
    }
}

async fn warte_auf_getrennt(
    rx: &mut Ereignisempfaenger,
    gesucht: VerbindungsId,
) -> (VerbindungsZustand, String) {
    loop {
        if let KanalEreignis::Getrennt { id, zustand, grund } = naechstes(rx).await {
            if id == gesucht {
                return (zustand, grund);
            }
        }
    }
}

async fn warte_auf_daten(rx: &mut Ereignisempfaenger) -> (VerbindungsId, Bytes) {
    loop {
        if let KanalEreignis::Daten { id, daten } = naechstes(rx).await {
            return (id, daten);
        }
    }
}

async fn warte_auf_anzahl(manager: &ChannelManager, anzahl: usize) {
    let warten = async {
        loop {
            if manager.verbindungen().await.unwrap().len() == anzahl {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(ZEITLIMIT, warten)
        .await
        .expect("Registry hat die erwartete Groesse nicht erreicht");
}

/// Adresse auf der garantiert niemand lauscht
async fn geschlossene_adresse() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let adresse = listener.local_addr().unwrap();
    drop(listener);
    adresse
}

// ---------------------------------------------------------------------------
// Ende-zu-Ende
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hi_von_b_nach_a() {
    logging();
    let (a, mut a_empfang) =
        SichereSitzung::starten(test_config(), test_schluessel(), AeadAlgorithmus::Aes256Gcm)
            .unwrap();
    let (b, mut b_empfang) =
        SichereSitzung::starten(test_config(), test_schluessel(), AeadAlgorithmus::Aes256Gcm)
            .unwrap();

    let adresse = a.manager().start_listening().await.unwrap();
    b.manager().connect_to_host(&adresse.to_string()).await.unwrap();

    for empfang in [&mut a_empfang, &mut b_empfang] {
        let ereignis = tokio::time::timeout(ZEITLIMIT, empfang.naechstes())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(ereignis, SitzungsEreignis::Verbunden { .. }));
    }

    assert_eq!(b.text_senden("hi").await.unwrap(), 1);

    let nachricht = tokio::time::timeout(ZEITLIMIT, a_empfang.naechste_nachricht())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(nachricht.typ, NachrichtenTyp::Text);
    assert_eq!(nachricht.als_text(), Some("hi"));

    // Und zurueck, diesmal ein Bild
    let bild = vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3];
    assert_eq!(a.bild_senden(&bild).await.unwrap(), 1);
    let nachricht = tokio::time::timeout(ZEITLIMIT, b_empfang.naechste_nachricht())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(nachricht.typ, NachrichtenTyp::Bild);
    assert_eq!(nachricht.inhalt, bild);
}

#[tokio::test]
async fn chacha_sitzung_ende_zu_ende() {
    logging();
    let algo = AeadAlgorithmus::ChaCha20Poly1305;
    let (a, mut a_empfang) = SichereSitzung::starten(test_config(), test_schluessel(), algo).unwrap();
    let (b, _b_empfang) = SichereSitzung::starten(test_config(), test_schluessel(), algo).unwrap();

    let adresse = a.manager().start_listening().await.unwrap();
    b.manager().connect_to_host(&adresse.to_string()).await.unwrap();

    // Noch nicht verbunden: die Nachricht wartet in der Sende-Queue
    assert_eq!(b.text_senden("frueh").await.unwrap(), 1);

    let nachricht = tokio::time::timeout(ZEITLIMIT, a_empfang.naechste_nachricht())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(nachricht.als_text(), Some("frueh"));
}

// ---------------------------------------------------------------------------
// Registry-Verhalten
// ---------------------------------------------------------------------------

#[tokio::test]
async fn eine_von_n_eingehenden_faellt_aus() {
    logging();
    let (manager, mut ereignisse) = ChannelManager::neu(test_config()).unwrap();
    let adresse = manager.start_listening().await.unwrap();

    let mut clients = Vec::new();
    let mut ids = Vec::new();
    for _ in 0..3 {
        let stream = TcpStream::connect(adresse).await.unwrap();
        let lokal = stream.local_addr().unwrap();
        clients.push(stream);
        let (id, peer) = warte_auf_verbunden(&mut ereignisse).await;
        assert_eq!(peer, Some(lokal));
        ids.push(id);
    }
    assert_eq!(manager.verbindungen().await.unwrap().len(), 3);

    // Client 0 schickt einen unmoeglichen Laengen-Header
    let mut kaputt = clients.remove(0);
    kaputt.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
    let (zustand, _) = warte_auf_getrennt(&mut ereignisse, ids[0]).await;
    assert_eq!(zustand, VerbindungsZustand::Fehlgeschlagen);

    let verbleibend = manager.verbindungen().await.unwrap();
    assert_eq!(verbleibend.len(), 2);
    assert!(verbleibend.iter().all(|v| v.id != ids[0]));
    assert!(verbleibend
        .iter()
        .all(|v| v.zustand == VerbindungsZustand::Bereit && v.richtung == Richtung::Eingehend));
    assert_eq!(manager.metriken().verbindungsfehler_total.get(), 1);

    // Die anderen senden und empfangen weiter
    assert_eq!(manager.send(&b"an alle"[..]).await.unwrap(), 2);
    let mut framed: Vec<_> = clients
        .into_iter()
        .map(|s| Framed::new(s, FrameCodec::new()))
        .collect();
    for client in framed.iter_mut() {
        let frame = tokio::time::timeout(ZEITLIMIT, client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(&frame[..], b"an alle");
    }

    framed[1].send(Bytes::from_static(b"von client 2")).await.unwrap();
    let (von, daten) = warte_auf_daten(&mut ereignisse).await;
    assert_eq!(von, ids[2]);
    assert_eq!(&daten[..], b"von client 2");
}

#[tokio::test]
async fn stop_leert_beide_registries() {
    logging();
    let (a, mut a_ereignisse) = ChannelManager::neu(test_config()).unwrap();
    let (b, mut b_ereignisse) = ChannelManager::neu(test_config()).unwrap();

    let adresse = a.start_listening().await.unwrap();
    b.connect_to_host(&adresse.to_string()).await.unwrap();
    let (a_id, _) = warte_auf_verbunden(&mut a_ereignisse).await;
    warte_auf_verbunden(&mut b_ereignisse).await;

    b.stop().await.unwrap();
    assert!(b.verbindungen().await.unwrap().is_empty());

    let (zustand, _) = warte_auf_getrennt(&mut a_ereignisse, a_id).await;
    assert_eq!(zustand, VerbindungsZustand::Abgebrochen);
    assert!(a.verbindungen().await.unwrap().is_empty());

    assert_eq!(b.send(&b"niemand"[..]).await.unwrap(), 0);
    assert_eq!(a.send(&b"niemand"[..]).await.unwrap(), 0);

    // Zweiter Stop ist harmlos
    b.stop().await.unwrap();
}

#[tokio::test]
async fn zweites_ziel_ersetzt_das_erste() {
    logging();
    let (a1, mut a1_ereignisse) = ChannelManager::neu(test_config()).unwrap();
    let (a2, mut a2_ereignisse) = ChannelManager::neu(test_config()).unwrap();
    let (b, mut b_ereignisse) = ChannelManager::neu(test_config()).unwrap();
    let adresse1 = a1.start_listening().await.unwrap();
    let adresse2 = a2.start_listening().await.unwrap();

    let erste = b.connect_to_host(&adresse1.to_string()).await.unwrap();
    let (a1_id, _) = warte_auf_verbunden(&mut a1_ereignisse).await;
    assert_eq!(warte_auf_verbunden(&mut b_ereignisse).await.0, erste);

    let zweite = b.connect_to_host(&adresse2.to_string()).await.unwrap();
    assert_ne!(erste, zweite);

    let (zustand, grund) = warte_auf_getrennt(&mut b_ereignisse, erste).await;
    assert_eq!(zustand, VerbindungsZustand::Abgebrochen);
    assert!(grund.contains("ersetzt"));
    assert_eq!(warte_auf_verbunden(&mut b_ereignisse).await.0, zweite);
    warte_auf_verbunden(&mut a2_ereignisse).await;

    let verbindungen = b.verbindungen().await.unwrap();
    assert_eq!(verbindungen.len(), 1);
    assert_eq!(verbindungen[0].id, zweite);
    assert_eq!(verbindungen[0].richtung, Richtung::Ausgehend);

    warte_auf_getrennt(&mut a1_ereignisse, a1_id).await;
    warte_auf_anzahl(&a1, 0).await;
}

#[tokio::test]
async fn verbindungsaufbau_zu_geschlossenem_port_schlaegt_fehl() {
    logging();
    let (manager, mut ereignisse) = ChannelManager::neu(test_config()).unwrap();
    let ziel = geschlossene_adresse().await;

    let id = manager.connect_to_host(&ziel.to_string()).await.unwrap();
    let (zustand, grund) = warte_auf_getrennt(&mut ereignisse, id).await;
    assert_eq!(zustand, VerbindungsZustand::Fehlgeschlagen);
    assert!(grund.contains(&ziel.to_string()));
    assert!(manager.verbindungen().await.unwrap().is_empty());
}

#[tokio::test]
async fn ungueltige_adresse_wird_abgelehnt() {
    let (manager, _ereignisse) = ChannelManager::neu(test_config()).unwrap();
    let ergebnis = manager.connect_to_host("host:abc").await;
    assert!(matches!(ergebnis, Err(KanalError::UngueltigeAdresse(_))));
    assert!(manager.verbindungen().await.unwrap().is_empty());
}

#[tokio::test]
async fn listener_doppelt_starten_und_bind_fehler() {
    logging();
    let (a, _a_ereignisse) = ChannelManager::neu(test_config()).unwrap();
    let adresse = a.start_listening().await.unwrap();
    assert_eq!(a.start_listening().await.unwrap(), adresse);

    let belegt = KanalConfig {
        port: adresse.port(),
        ..test_config()
    };
    let (b, _b_ereignisse) = ChannelManager::neu(belegt).unwrap();
    let ergebnis = b.start_listening().await;
    assert!(matches!(ergebnis, Err(KanalError::BindFehler { .. })));

    // Manager laeuft trotzdem weiter
    assert!(b.verbindungen().await.unwrap().is_empty());
}

#[tokio::test]
async fn drop_aller_handles_stoppt_manager() {
    logging();
    let (manager, mut ereignisse) = ChannelManager::neu(test_config()).unwrap();
    let adresse = manager.start_listening().await.unwrap();
    let mut client = TcpStream::connect(adresse).await.unwrap();
    let (id, _) = warte_auf_verbunden(&mut ereignisse).await;

    drop(manager);

    let (zustand, _) = warte_auf_getrennt(&mut ereignisse, id).await;
    assert_eq!(zustand, VerbindungsZustand::Abgebrochen);
    let ende = tokio::time::timeout(ZEITLIMIT, ereignisse.recv()).await.unwrap();
    assert!(ende.is_none());

    let mut puffer = [0u8; 8];
    let gelesen = tokio::time::timeout(ZEITLIMIT, client.read(&mut puffer))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(gelesen, 0);
}

#[tokio::test]
async fn ungueltige_konfiguration() {
    let config = KanalConfig {
        sende_queue_groesse: 0,
        ..test_config()
    };
    assert!(matches!(
        ChannelManager::neu(config),
        Err(KanalError::Konfiguration(_))
    ));
}

#[tokio::test]
async fn zu_grosse_nachricht_wird_abgelehnt() {
    let config = KanalConfig {
        max_frame_groesse: 16,
        ..test_config()
    };
    let (manager, _ereignisse) = ChannelManager::neu(config).unwrap();
    let ergebnis = manager.send(vec![0u8; 17]).await;
    assert!(matches!(ergebnis, Err(KanalError::Protokoll(_))));
}

// ---------------------------------------------------------------------------
// Framing und Verwerfen
// ---------------------------------------------------------------------------

#[tokio::test]
async fn framing_unabhaengig_von_tcp_zerlegung() {
    logging();
    let (manager, mut ereignisse) = ChannelManager::neu(test_config()).unwrap();
    let adresse = manager.start_listening().await.unwrap();
    let mut client = TcpStream::connect(adresse).await.unwrap();
    client.set_nodelay(true).unwrap();
    warte_auf_verbunden(&mut ereignisse).await;

    let frame = |payload: &[u8]| {
        let mut f = (payload.len() as u32).to_be_bytes().to_vec();
        f.extend_from_slice(payload);
        f
    };

    // Byteweise
    for byte in frame(b"stueckchenweise") {
        client.write_all(&[byte]).await.unwrap();
        client.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    // Zwei Frames in einem Schreibvorgang
    let mut doppelt = frame(b"erster");
    doppelt.extend(frame(b"zweiter"));
    client.write_all(&doppelt).await.unwrap();
    // Groesser als ein Empfangs-Chunk
    let gross: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    client.write_all(&frame(&gross)).await.unwrap();

    let erwartet: [&[u8]; 4] = [b"stueckchenweise", b"erster", b"zweiter", &gross];
    for payload in erwartet {
        let (_, daten) = warte_auf_daten(&mut ereignisse).await;
        assert_eq!(&daten[..], payload);
    }
    assert_eq!(manager.metriken().frames_empfangen_total.get(), 4);
}

#[tokio::test]
async fn kaputte_nachrichten_werden_verworfen_verbindung_bleibt() {
    logging();
    let (a, mut a_empfang) =
        SichereSitzung::starten(test_config(), test_schluessel(), AeadAlgorithmus::Aes256Gcm)
            .unwrap();
    let (b, mut b_ereignisse) = ChannelManager::neu(test_config()).unwrap();

    let adresse = a.manager().start_listening().await.unwrap();
    b.connect_to_host(&adresse.to_string()).await.unwrap();
    warte_auf_verbunden(&mut b_ereignisse).await;

    // Kein JSON
    b.send(&b"kein umschlag"[..]).await.unwrap();
    // Falscher Schluessel
    let falsch = seal(b"boese", &Sitzungsschluessel::zufaellig()).unwrap();
    b.send(encode(NachrichtenTyp::Text, &falsch)).await.unwrap();
    // Richtiger Schluessel
    let richtig = seal(b"gut", &test_schluessel()).unwrap();
    b.send(encode(NachrichtenTyp::Text, &richtig)).await.unwrap();

    let nachricht = tokio::time::timeout(ZEITLIMIT, a_empfang.naechste_nachricht())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(nachricht.als_text(), Some("gut"));

    let metriken = a.manager().metriken();
    assert_eq!(metriken.verworfen_anzahl(VerwerfGrund::Umschlag), 1);
    assert_eq!(metriken.verworfen_anzahl(VerwerfGrund::Authentifizierung), 1);
    assert_eq!(a.manager().verbindungen().await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Zeitlimits und Gegendruck
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lese_zeitlimit_beendet_stille_verbindung() {
    logging();
    let config = KanalConfig {
        lese_timeout_sek: Some(1),
        ..test_config()
    };
    let (manager, mut ereignisse) = ChannelManager::neu(config).unwrap();
    let adresse = manager.start_listening().await.unwrap();

    // Verbindet sich und schweigt
    let _client = TcpStream::connect(adresse).await.unwrap();
    let (id, _) = warte_auf_verbunden(&mut ereignisse).await;

    let (zustand, grund) = warte_auf_getrennt(&mut ereignisse, id).await;
    assert_eq!(zustand, VerbindungsZustand::Fehlgeschlagen);
    assert!(grund.contains("Lese-Zeitlimit"), "grund: {grund}");
    assert!(manager.verbindungen().await.unwrap().is_empty());
    assert_eq!(manager.metriken().verbindungsfehler_total.get(), 1);
}

#[tokio::test]
async fn verbindungsaufbau_ohne_antwort_schlaegt_fehl() {
    logging();
    let config = KanalConfig {
        verbindungs_timeout_sek: 1,
        ..test_config()
    };
    let (manager, mut ereignisse) = ChannelManager::neu(config).unwrap();

    // Nicht routbar: entweder laeuft das Zeitlimit ab oder der Stack lehnt sofort ab
    let ziel = "10.255.255.1:9";
    let id = manager.connect_to_host(ziel).await.unwrap();

    let (zustand, grund) = warte_auf_getrennt(&mut ereignisse, id).await;
    assert_eq!(zustand, VerbindungsZustand::Fehlgeschlagen);
    assert!(grund.contains(ziel), "grund: {grund}");
    assert!(manager.verbindungen().await.unwrap().is_empty());
}

#[tokio::test]
async fn schreib_zeitlimit_bei_peer_der_nicht_liest() {
    logging();
    let config = KanalConfig {
        schreib_timeout_sek: 1,
        ..test_config()
    };
    let (manager, mut ereignisse) = ChannelManager::neu(config).unwrap();
    let adresse = manager.start_listening().await.unwrap();

    let _stumm = TcpStream::connect(adresse).await.unwrap();
    let (id, _) = warte_auf_verbunden(&mut ereignisse).await;

    // Mehr als Sende- und Empfangspuffer des Kernels aufnehmen koennen
    let gross = Bytes::from(vec![0x5A; 8 * 1024 * 1024]);
    for _ in 0..6 {
        assert_eq!(manager.send(gross.clone()).await.unwrap(), 1);
    }

    let (zustand, grund) = warte_auf_getrennt(&mut ereignisse, id).await;
    assert_eq!(zustand, VerbindungsZustand::Fehlgeschlagen);
    assert!(grund.contains("Schreib-Zeitlimit"), "grund: {grund}");
    assert!(manager.verbindungen().await.unwrap().is_empty());
}

#[tokio::test]
async fn volle_sende_queue_verwirft_nur_fuer_diesen_peer() {
    logging();
    let config = KanalConfig {
        sende_queue_groesse: 1,
        schreib_timeout_sek: 60,
        ..test_config()
    };
    let (manager, mut ereignisse) = ChannelManager::neu(config).unwrap();
    let adresse = manager.start_listening().await.unwrap();

    let _stumm = TcpStream::connect(adresse).await.unwrap();
    let (stumm_id, _) = warte_auf_verbunden(&mut ereignisse).await;
    let aktiv = TcpStream::connect(adresse).await.unwrap();
    warte_auf_verbunden(&mut ereignisse).await;

    // Der aktive Peer liest alles mit
    let (frames_tx, mut frames_rx) = tokio::sync::mpsc::unbounded_channel::<Bytes>();
    tokio::spawn(async move {
        let mut framed = Framed::new(aktiv, FrameCodec::new());
        while let Some(Ok(frame)) = framed.next().await {
            if frames_tx.send(frame).is_err() {
                break;
            }
        }
    });

    let block = Bytes::from(vec![0xAB; 1024 * 1024]);
    let mut runden = 0;
    loop {
        runden += 1;
        assert!(runden <= 300, "Sende-Queue des stummen Peers lief nie voll");
        manager.send(block.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        if manager.metriken().verworfen_anzahl(VerwerfGrund::SendeQueue) > 0 {
            // Der lesende Peer leert seine Queue, der stumme bleibt voll
            tokio::time::sleep(Duration::from_millis(200)).await;
            if manager.send(&b"noch da"[..]).await.unwrap() == 1 {
                break;
            }
        }
    }

    let warten = async {
        while let Some(frame) = frames_rx.recv().await {
            if &frame[..] == b"noch da" {
                return;
            }
        }
        panic!("Lesender Peer wurde getrennt");
    };
    tokio::time::timeout(ZEITLIMIT, warten)
        .await
        .expect("Markierung kam beim lesenden Peer nicht an");

    // Verwerfen trennt den stummen Peer nicht
    let verbindungen = manager.verbindungen().await.unwrap();
    assert_eq!(verbindungen.len(), 2);
    assert!(verbindungen.iter().any(|v| v.id == stumm_id));
    assert!(manager.metriken().verworfen_anzahl(VerwerfGrund::SendeQueue) >= 1);
}
