use core::convert::TryInto;
use std::{thread, time::Duration};

use anyhow::{anyhow, bail, Context};
use embedded_svc::{
    http::{client::Client as HttpClient, Status},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};
use rand::{rngs::StdRng, SeedableRng};

use smarthub_common::{
    config::NetworkConfig, Actuator, ActuatorPins, Endpoints, HttpResponse, HttpTransport,
    NetworkLink, PinConfig, PinError, RuntimeConfig, SamplingMode, SimulatedSensors, SmartHub,
    TransportError,
};

const MAX_HTTP_BODY: usize = 4096;
const READ_CHUNK_SIZE: usize = 512;

type OutputDriver = PinDriver<'static, AnyOutputPin, Output>;

struct EspLink;

struct EspHttpTransport {
    timeout: Duration,
}

struct EspActuatorPins {
    fan: OutputDriver,
    light: OutputDriver,
    presence: OutputDriver,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let runtime = build_time_config();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let Peripherals { modem, .. } = Peripherals::take()?;

    let pins = EspActuatorPins::new(&runtime.pins).context("failed to claim actuator pins")?;

    let wifi = connect_wifi(
        modem,
        sys_loop,
        nvs_partition,
        &runtime.network,
        Duration::from_millis(runtime.hub.wifi_poll_interval_ms),
    )
    .context("wifi startup failed")?;

    let endpoints = Endpoints::from_network(&runtime.network);
    info!(
        "polling {} and {} every {}ms",
        endpoints.info_url, endpoints.state_url, runtime.hub.poll_interval_ms
    );

    let transport = EspHttpTransport {
        timeout: Duration::from_millis(runtime.hub.http_timeout_ms),
    };
    let sensors = SimulatedSensors::new(StdRng::from_entropy(), runtime.hub.sampling);
    info!("simulated sensors in {:?} mode", sensors.mode());
    let poll_interval = Duration::from_millis(runtime.hub.poll_interval_ms);
    let mut hub = SmartHub::new(runtime.hub, endpoints, EspLink, transport, pins, sensors);

    // Keep the driver alive for the program lifetime.
    let _wifi = wifi;

    loop {
        hub.poll_once();
        thread::sleep(poll_interval);
    }
}

fn build_time_config() -> RuntimeConfig {
    let mut runtime = RuntimeConfig::default();
    runtime.network.wifi_ssid = option_env!("WIFI_SSID").unwrap_or_default().to_string();
    runtime.network.wifi_pass = option_env!("WIFI_PASS").unwrap_or_default().to_string();

    if let Some(host) = option_env!("API_HOST") {
        runtime.network.api_host = host.to_string();
    }
    if let Some(scheme) = option_env!("API_SCHEME") {
        runtime.network.api_scheme = scheme.to_string();
    }
    if let Some(mode) = option_env!("SMARTHUB_SAMPLING").and_then(SamplingMode::parse) {
        runtime.hub.sampling = mode;
    }

    runtime.sanitize();
    runtime
}

/// Blocks until the station is associated and has an address. There is no
/// timeout: without a network the device has nothing else to do.
fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
    retry_delay: Duration,
) -> anyhow::Result<EspWifi<'static>> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    if !network.has_station_credentials() {
        warn!("WIFI_SSID was not set at build time; association will not succeed");
    }

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("connecting to wifi `{}`", network.wifi_ssid);

    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => break,
            Err(err) => {
                info!(". (attempt {attempt}: {err})");
                let _ = wifi.disconnect();
                thread::sleep(retry_delay);
            }
        }
    }

    let ip_info = wifi.wifi().sta_netif().get_ip_info()?;
    info!(
        "connected to wifi network with IP address {} after {attempt} attempt(s)",
        ip_info.ip
    );

    drop(wifi);
    Ok(esp_wifi)
}

impl NetworkLink for EspLink {
    fn is_connected(&self) -> bool {
        let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
        let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
        rc == esp_idf_svc::sys::ESP_OK
    }
}

impl EspHttpTransport {
    // The client is dropped when the calling method returns, which closes the
    // underlying esp_http_client handle on every path.
    fn open(&self) -> Result<HttpClient<EspHttpConnection>, TransportError> {
        let conf = HttpClientConfiguration {
            timeout: Some(self.timeout),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let connection = EspHttpConnection::new(&conf)
            .map_err(|err| TransportError::Connect(format!("{err:?}")))?;
        Ok(HttpClient::wrap(connection))
    }
}

impl HttpTransport for EspHttpTransport {
    fn post_json(&mut self, url: &str, body: &str) -> Result<HttpResponse, TransportError> {
        let mut client = self.open()?;
        let content_length = body.len().to_string();
        let headers = [
            ("Content-type", "application/json"),
            ("Content-Length", content_length.as_str()),
        ];

        let mut request = client.post(url, &headers).map_err(connect_error)?;
        request.write_all(body.as_bytes()).map_err(io_error)?;
        request.flush().map_err(io_error)?;
        let response = request.submit().map_err(io_error)?;
        read_response(response)
    }

    fn get(&mut self, url: &str) -> Result<HttpResponse, TransportError> {
        let mut client = self.open()?;
        let request = client.get(url).map_err(connect_error)?;
        let response = request.submit().map_err(io_error)?;
        read_response(response)
    }
}

fn read_response<R>(mut response: R) -> Result<HttpResponse, TransportError>
where
    R: Read + Status,
{
    let status = response.status();
    let mut body = Vec::new();
    let mut chunk = [0_u8; READ_CHUNK_SIZE];

    loop {
        let read = response.read(&mut chunk).map_err(io_error)?;
        if read == 0 {
            break;
        }
        if body.len() + read > MAX_HTTP_BODY {
            return Err(TransportError::BodyTooLarge {
                limit: MAX_HTTP_BODY,
            });
        }
        body.extend_from_slice(&chunk[..read]);
    }

    Ok(HttpResponse {
        status,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn connect_error<E: core::fmt::Debug>(err: E) -> TransportError {
    TransportError::Connect(format!("{err:?}"))
}

fn io_error<E: core::fmt::Debug>(err: E) -> TransportError {
    TransportError::Io(format!("{err:?}"))
}

impl EspActuatorPins {
    fn new(pins: &PinConfig) -> anyhow::Result<Self> {
        if !pins.is_distinct() {
            bail!("actuator pins must be distinct, got {:?}", pins.as_array());
        }

        let driver = Self {
            fan: output_pin(pins.fan_pin).context("fan pin")?,
            light: output_pin(pins.light_pin).context("light pin")?,
            presence: output_pin(pins.presence_pin).context("presence pin")?,
        };
        info!(
            "actuators on GPIO{} (fan), GPIO{} (light), GPIO{} (presence)",
            pins.fan_pin, pins.light_pin, pins.presence_pin
        );
        Ok(driver)
    }
}

impl ActuatorPins for EspActuatorPins {
    fn write(&mut self, actuator: Actuator, on: bool) -> Result<(), PinError> {
        let driver = match actuator {
            Actuator::Fan => &mut self.fan,
            Actuator::Light => &mut self.light,
            Actuator::PresenceIndicator => &mut self.presence,
        };

        let result = if on {
            driver.set_high()
        } else {
            driver.set_low()
        };
        result.map_err(|err| PinError {
            actuator,
            reason: err.to_string(),
        })
    }
}

fn output_pin(pin: i32) -> anyhow::Result<OutputDriver> {
    // Pin numbers are sanitized and checked distinct, so each pad is claimed once.
    let mut driver = unsafe { PinDriver::output(AnyOutputPin::new(pin)) }?;
    driver.set_low()?;
    Ok(driver)
}
