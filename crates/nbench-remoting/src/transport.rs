//! WinRM SOAP/HTTP transport layer.
//!
//! Implements the subset of WS-Management needed to drive a remote
//! `cmd` shell: shell create/delete, command execution, stdin streaming,
//! output collection and signalling.

use base64::Engine;
use log::{debug, error, trace};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use uuid::Uuid;

use crate::error::{RemotingError, RemotingResult};
use crate::types::*;

// ─── Transport State ─────────────────────────────────────────────────────────

/// HTTP transport bound to one WinRM endpoint.
#[derive(Debug)]
pub struct WinRmTransport {
    client: reqwest::Client,
    endpoint: String,
    auth_header: Option<String>,
    /// Operation timeout as ISO 8601 duration
    operation_timeout: String,
    locale: String,
    max_input_slice: usize,
    request_counter: u64,
}

impl WinRmTransport {
    /// Create a transport for `host` from the shared configuration.
    pub fn new(config: &RemotingConfig, host: &str) -> RemotingResult<Self> {
        let endpoint = config.endpoint_uri(host);

        let mut client_builder = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(
                config.session_option.operation_timeout_sec as u64 + 30,
            ))
            .connect_timeout(std::time::Duration::from_secs(
                config.session_option.open_timeout_sec as u64,
            ));

        if config.skip_ca_check {
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }

        if let Some(ref path) = config.trusted_certificate {
            let pem = std::fs::read(path).map_err(|e| {
                RemotingError::invalid_config(format!(
                    "Failed to read certificate '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                RemotingError::invalid_config(format!(
                    "Invalid certificate '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            client_builder = client_builder.add_root_certificate(cert);
        }

        let client = client_builder.build().map_err(|e| {
            RemotingError::invalid_config(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            endpoint,
            auth_header: None,
            operation_timeout: format!("PT{}S", config.session_option.operation_timeout_sec),
            locale: config.session_option.culture.clone(),
            max_input_slice: config.session_option.max_input_slice.max(1),
            request_counter: 0,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn set_auth_header(&mut self, header: String) {
        self.auth_header = Some(header);
    }

    /// Send a raw SOAP envelope and return the response body.
    pub async fn send_message(&mut self, soap_body: &str) -> RemotingResult<String> {
        let (req_id, status, body) = self.post(soap_body).await?;
        if !status.is_success() {
            return Err(fault_error(req_id, status, &body));
        }
        Ok(body)
    }

    /// POST an envelope and return the status and body, whatever the status.
    async fn post(
        &mut self,
        soap_body: &str,
    ) -> RemotingResult<(u64, reqwest::StatusCode, String)> {
        self.request_counter += 1;
        let req_id = self.request_counter;

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/soap+xml;charset=UTF-8"),
        );

        if let Some(ref auth) = self.auth_header {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(auth).map_err(|e| {
                    RemotingError::invalid_config(format!("Invalid auth header: {}", e))
                })?,
            );
        }

        debug!(
            "WinRM request #{} to {} ({} bytes)",
            req_id,
            self.endpoint,
            soap_body.len()
        );
        trace!("WinRM request #{} body:\n{}", req_id, soap_body);

        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .body(soap_body.to_string())
            .send()
            .await
            .map_err(|e| RemotingError::transport(format!("WinRM HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            RemotingError::transport(format!("Failed to read WinRM response body: {}", e))
        })?;

        trace!("WinRM response #{}: status={}, body:\n{}", req_id, status, body);
        Ok((req_id, status, body))
    }

    // ─── Shell Management ────────────────────────────────────────────────

    /// Create a remote `cmd` shell and return its shell ID.
    pub async fn create_shell(&mut self, options: &SessionOption) -> RemotingResult<String> {
        let message_id = Uuid::new_v4().to_string();
        let shell_id = Uuid::new_v4().to_string().to_uppercase();

        let envelope = build_create_shell_envelope(
            &self.endpoint,
            &message_id,
            &self.operation_timeout,
            &self.locale,
            options,
            &shell_id,
        );

        let response = self.send_message(&envelope).await?;

        // The server may assign its own ID
        let actual_shell_id = extract_shell_id(&response).unwrap_or(shell_id);
        debug!("Created WinRM shell: {}", actual_shell_id);

        Ok(actual_shell_id)
    }

    /// Delete (close) a remote shell.
    pub async fn delete_shell(&mut self, shell_id: &str) -> RemotingResult<()> {
        let message_id = Uuid::new_v4().to_string();
        let envelope =
            build_delete_shell_envelope(&self.endpoint, &message_id, shell_id, &self.operation_timeout);

        self.send_message(&envelope).await?;
        debug!("Deleted WinRM shell: {}", shell_id);
        Ok(())
    }

    /// Execute a command within a shell and return the command ID.
    pub async fn execute_command(
        &mut self,
        shell_id: &str,
        command: &str,
        arguments: &[String],
    ) -> RemotingResult<String> {
        let message_id = Uuid::new_v4().to_string();
        let command_id = Uuid::new_v4().to_string().to_uppercase();

        let envelope = build_command_envelope(
            &self.endpoint,
            &message_id,
            shell_id,
            command,
            arguments,
            &self.operation_timeout,
        );

        let response = self.send_message(&envelope).await?;
        let actual_command_id = extract_command_id(&response).unwrap_or(command_id);

        debug!("Executed command in shell {}: {}", shell_id, actual_command_id);
        Ok(actual_command_id)
    }

    /// Start a PowerShell script via `powershell.exe -EncodedCommand`.
    pub async fn execute_ps_command(&mut self, shell_id: &str, script: &str) -> RemotingResult<String> {
        self.execute_command(
            shell_id,
            "powershell.exe",
            &[
                "-NoProfile".to_string(),
                "-NonInteractive".to_string(),
                "-EncodedCommand".to_string(),
                encode_ps_script(script),
            ],
        )
        .await
    }

    /// Receive one batch of output. Returns the decoded batch.
    pub async fn receive_output(
        &mut self,
        shell_id: &str,
        command_id: &str,
    ) -> RemotingResult<ReceiveBatch> {
        let message_id = Uuid::new_v4().to_string();
        let envelope = build_receive_envelope(
            &self.endpoint,
            &message_id,
            shell_id,
            command_id,
            &self.operation_timeout,
        );

        let (req_id, status, body) = self.post(&envelope).await?;
        if status.is_success() {
            return Ok(parse_receive_response(&body));
        }
        // No output within OperationTimeout; the command is still running
        if is_operation_timeout(&body) {
            debug!("Receive #{} timed out for command {}, polling again", req_id, command_id);
            return Ok(ReceiveBatch::default());
        }
        Err(fault_error(req_id, status, &body))
    }

    /// Poll until the command reports `Done`.
    pub async fn receive_all_output(
        &mut self,
        shell_id: &str,
        command_id: &str,
    ) -> RemotingResult<CommandOutput> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;

        loop {
            let batch = self.receive_output(shell_id, command_id).await?;
            stdout.extend_from_slice(&batch.stdout);
            stderr.extend_from_slice(&batch.stderr);
            if batch.exit_code.is_some() {
                exit_code = batch.exit_code;
            }
            if batch.done {
                break;
            }
        }

        // Streams may split a multibyte character across blocks
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
        })
    }

    /// Write to a running command's stdin.
    pub async fn send_input(
        &mut self,
        shell_id: &str,
        command_id: &str,
        data: &[u8],
        end_of_stream: bool,
    ) -> RemotingResult<()> {
        let message_id = Uuid::new_v4().to_string();
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);

        let envelope = build_send_envelope(
            &self.endpoint,
            &message_id,
            shell_id,
            command_id,
            &encoded,
            end_of_stream,
            &self.operation_timeout,
        );

        self.send_message(&envelope).await?;
        Ok(())
    }

    /// Send a signal to a command (e.g. terminate).
    pub async fn signal_command(
        &mut self,
        shell_id: &str,
        command_id: &str,
        signal_code: &str,
    ) -> RemotingResult<()> {
        let message_id = Uuid::new_v4().to_string();
        let envelope = build_signal_envelope(
            &self.endpoint,
            &message_id,
            shell_id,
            command_id,
            signal_code,
            &self.operation_timeout,
        );

        self.send_message(&envelope).await?;
        debug!("Sent signal {} to command {} in shell {}", signal_code, command_id, shell_id);
        Ok(())
    }

    /// Run a script to completion, optionally feeding `stdin`.
    ///
    /// Stdin is split into envelope-sized slices; the last carries `End="true"`.
    pub async fn run_ps(
        &mut self,
        shell_id: &str,
        script: &str,
        stdin: Option<&[u8]>,
    ) -> RemotingResult<CommandOutput> {
        let command_id = self.execute_ps_command(shell_id, script).await?;

        if let Some(data) = stdin {
            let slices = input_slices(data, self.max_input_slice);
            let last = slices.len().saturating_sub(1);
            for (idx, slice) in slices.into_iter().enumerate() {
                self.send_input(shell_id, &command_id, slice, idx == last).await?;
            }
        }

        let output = self.receive_all_output(shell_id, &command_id).await?;
        // The command is already done; a failed terminate only leaks server bookkeeping
        if let Err(e) = self
            .signal_command(shell_id, &command_id, WsManSignal::TERMINATE)
            .await
        {
            debug!("Terminate signal for {} failed: {}", command_id, e);
        }
        Ok(output)
    }
}

/// Split `data` into at most `max`-byte slices; empty input still yields one slice.
fn input_slices(data: &[u8], max: usize) -> Vec<&[u8]> {
    if data.is_empty() {
        return vec![data];
    }
    data.chunks(max).collect()
}

/// Encode a script the way `powershell.exe -EncodedCommand` expects (UTF-16LE, base64).
pub fn encode_ps_script(script: &str) -> String {
    let utf16: Vec<u8> = script
        .encode_utf16()
        .flat_map(|c| c.to_le_bytes())
        .collect();
    base64::engine::general_purpose::STANDARD.encode(&utf16)
}

// ─── SOAP Envelope Builders ──────────────────────────────────────────────────

fn build_soap_header(
    action: &str,
    endpoint: &str,
    message_id: &str,
    shell_id: Option<&str>,
    timeout: &str,
) -> String {
    let mut header = format!(
        r#"<s:Header>
      <a:To>{endpoint}</a:To>
      <a:Action s:mustUnderstand="true">{action}</a:Action>
      <w:ResourceURI s:mustUnderstand="true">{resource}</w:ResourceURI>
      <a:MessageID>uuid:{message_id}</a:MessageID>
      <a:ReplyTo>
        <a:Address s:mustUnderstand="true">http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous</a:Address>
      </a:ReplyTo>
      <w:MaxEnvelopeSize s:mustUnderstand="true">512000</w:MaxEnvelopeSize>
      <w:OperationTimeout>{timeout}</w:OperationTimeout>"#,
        endpoint = endpoint,
        action = action,
        resource = WsManResourceUri::SHELL,
        message_id = message_id,
        timeout = timeout,
    );

    if let Some(sid) = shell_id {
        header.push_str(&format!(
            r#"
      <w:SelectorSet>
        <w:Selector Name="ShellId">{}</w:Selector>
      </w:SelectorSet>"#,
            sid
        ));
    }

    header.push_str("\n    </s:Header>");
    header
}

fn wrap_envelope(header: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="{soap}" xmlns:a="{addr}" xmlns:w="{wsman}" xmlns:p="{wsmand}" xmlns:rsp="{shell}">
    {header}
    <s:Body>
      {body}
    </s:Body>
</s:Envelope>"#,
        soap = WsManNamespace::SOAP,
        addr = WsManNamespace::ADDRESSING,
        wsman = WsManNamespace::WSMAN,
        wsmand = WsManNamespace::WSMAND,
        shell = WsManNamespace::SHELL,
        header = header,
        body = body,
    )
}

fn build_create_shell_envelope(
    endpoint: &str,
    message_id: &str,
    timeout: &str,
    locale: &str,
    options: &SessionOption,
    shell_id: &str,
) -> String {
    let mut header = build_soap_header(WsManAction::Create.uri(), endpoint, message_id, None, timeout);
    header = header.replace(
        "\n    </s:Header>",
        &format!(
            "\n      <w:Locale xml:lang=\"{}\" s:mustUnderstand=\"false\"/>\n    </s:Header>",
            xml_escape(locale)
        ),
    );

    let body = format!(
        r#"<rsp:Shell ShellId="{shell_id}">
        <rsp:InputStreams>stdin</rsp:InputStreams>
        <rsp:OutputStreams>stdout stderr</rsp:OutputStreams>
        <rsp:IdleTimeOut>PT{idle}S</rsp:IdleTimeOut>
        <w:OptionSet>
          <w:Option Name="WINRS_NOPROFILE">{no_profile}</w:Option>
          <w:Option Name="WINRS_CODEPAGE">65001</w:Option>
        </w:OptionSet>
      </rsp:Shell>"#,
        shell_id = shell_id,
        idle = options.idle_timeout_sec,
        no_profile = if options.skip_machine_profile { "TRUE" } else { "FALSE" },
    );

    wrap_envelope(&header, &body)
}

fn build_delete_shell_envelope(endpoint: &str, message_id: &str, shell_id: &str, timeout: &str) -> String {
    let header = build_soap_header(WsManAction::Delete.uri(), endpoint, message_id, Some(shell_id), timeout);
    wrap_envelope(&header, "")
}

fn build_command_envelope(
    endpoint: &str,
    message_id: &str,
    shell_id: &str,
    command: &str,
    arguments: &[String],
    timeout: &str,
) -> String {
    let header = build_soap_header(WsManAction::Command.uri(), endpoint, message_id, Some(shell_id), timeout);

    let args_xml: String = arguments
        .iter()
        .map(|a| format!("<rsp:Arguments>{}</rsp:Arguments>", xml_escape(a)))
        .collect::<Vec<_>>()
        .join("\n        ");

    let body = format!(
        r#"<rsp:CommandLine>
        <rsp:Command>{command}</rsp:Command>
        {args}
      </rsp:CommandLine>"#,
        command = xml_escape(command),
        args = args_xml,
    );

    wrap_envelope(&header, &body)
}

fn build_receive_envelope(
    endpoint: &str,
    message_id: &str,
    shell_id: &str,
    command_id: &str,
    timeout: &str,
) -> String {
    let header = build_soap_header(WsManAction::Receive.uri(), endpoint, message_id, Some(shell_id), timeout);
    let body = format!(
        r#"<rsp:Receive>
        <rsp:DesiredStream CommandId="{command_id}">stdout stderr</rsp:DesiredStream>
      </rsp:Receive>"#,
        command_id = command_id,
    );
    wrap_envelope(&header, &body)
}

fn build_send_envelope(
    endpoint: &str,
    message_id: &str,
    shell_id: &str,
    command_id: &str,
    encoded_data: &str,
    end_of_stream: bool,
    timeout: &str,
) -> String {
    let header = build_soap_header(WsManAction::Send.uri(), endpoint, message_id, Some(shell_id), timeout);
    let end_attr = if end_of_stream { r#" End="true""# } else { "" };
    let body = format!(
        r#"<rsp:Send>
        <rsp:Stream Name="stdin" CommandId="{command_id}"{end}>{data}</rsp:Stream>
      </rsp:Send>"#,
        command_id = command_id,
        end = end_attr,
        data = encoded_data,
    );
    wrap_envelope(&header, &body)
}

fn build_signal_envelope(
    endpoint: &str,
    message_id: &str,
    shell_id: &str,
    command_id: &str,
    signal_code: &str,
    timeout: &str,
) -> String {
    let header = build_soap_header(WsManAction::Signal.uri(), endpoint, message_id, Some(shell_id), timeout);
    let body = format!(
        r#"<rsp:Signal CommandId="{command_id}">
        <rsp:Code>{signal}</rsp:Code>
      </rsp:Signal>"#,
        command_id = command_id,
        signal = signal_code,
    );
    wrap_envelope(&header, &body)
}

// ─── Response Parsers ────────────────────────────────────────────────────────

/// One decoded `ReceiveResponse`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveBatch {
    /// Raw stdout bytes; decoded once the command is done.
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub done: bool,
    pub exit_code: Option<i32>,
}

/// Value of an attribute `name="..."` or element `<rsp:name>...</...>`.
fn extract_id(response: &str, name: &str) -> Option<String> {
    let attr = format!("{}=\"", name);
    if let Some(start) = response.find(&attr) {
        let rest = &response[start + attr.len()..];
        if let Some(end) = rest.find('"') {
            return Some(rest[..end].to_string());
        }
    }
    let element = format!("<rsp:{}>", name);
    if let Some(start) = response.find(&element) {
        let rest = &response[start + element.len()..];
        if let Some(end) = rest.find('<') {
            return Some(rest[..end].to_string());
        }
    }
    None
}

fn extract_shell_id(response: &str) -> Option<String> {
    extract_id(response, "ShellId")
}

fn extract_command_id(response: &str) -> Option<String> {
    extract_id(response, "CommandId")
}

/// Decode stdout/stderr streams, the Done state and the exit code.
pub fn parse_receive_response(response: &str) -> ReceiveBatch {
    let mut batch = ReceiveBatch::default();

    extract_stream_data(response, "stdout", &mut batch.stdout);
    extract_stream_data(response, "stderr", &mut batch.stderr);

    batch.done = response.contains("CommandState/Done\"") || response.contains("State=\"Done\"");

    if let Some(start) = response.find("<rsp:ExitCode>") {
        let rest = &response[start + "<rsp:ExitCode>".len()..];
        if let Some(end) = rest.find('<') {
            batch.exit_code = rest[..end].trim().parse::<i32>().ok();
        }
    }

    batch
}

/// Append every base64 block of stream `stream_name` to `output`.
fn extract_stream_data(response: &str, stream_name: &str, output: &mut Vec<u8>) {
    let pattern = format!("Name=\"{}\"", stream_name);
    let mut search_from = 0;

    while let Some(attr_pos) = response[search_from..].find(&pattern) {
        let abs_pos = search_from + attr_pos;
        let Some(gt_pos) = response[abs_pos..].find('>') else {
            break;
        };
        // Self-closing stream elements (`End="true"/>`) carry no data
        if response[..abs_pos + gt_pos].ends_with('/') {
            search_from = abs_pos + gt_pos + 1;
            continue;
        }
        let data_start = abs_pos + gt_pos + 1;
        let Some(end_pos) = response[data_start..].find("</rsp:Stream>") else {
            break;
        };
        let encoded = response[data_start..data_start + end_pos].trim();
        if !encoded.is_empty() {
            if let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) {
                output.extend_from_slice(&decoded);
            }
        }
        search_from = data_start + end_pos;
    }
}

/// WSManFault code for a Receive that produced nothing within OperationTimeout.
const OPERATION_TIMEOUT_FAULT: &str = "2150858793";

/// True when a fault body reports an expired OperationTimeout.
pub fn is_operation_timeout(response: &str) -> bool {
    response.contains(&format!("Code=\"{}\"", OPERATION_TIMEOUT_FAULT))
        || response.contains("w:TimedOut")
}

fn fault_error(req_id: u64, status: reqwest::StatusCode, body: &str) -> RemotingError {
    let fault = parse_soap_fault(body).unwrap_or_else(|| body.to_string());
    error!("WinRM request #{} failed: {} - {}", req_id, status, fault);
    RemotingError::transport(format!("WinRM error (HTTP {}): {}", status, fault))
}

/// Extract a readable message from a SOAP fault.
pub fn parse_soap_fault(response: &str) -> Option<String> {
    if let Some(start) = response.find("Message=\"") {
        let rest = &response[start + 9..];
        if let Some(end) = rest.find('"') {
            return Some(rest[..end].to_string());
        }
    }
    if let Some(start) = response.find("<s:Text") {
        if let Some(gt) = response[start..].find('>') {
            let text_start = start + gt + 1;
            if let Some(end) = response[text_start..].find("</s:Text>") {
                return Some(response[text_start..text_start + end].to_string());
            }
        }
    }
    None
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
